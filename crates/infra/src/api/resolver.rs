//! Resolves `(resource, method, params)` into a concrete HTTP request.
//!
//! The set of callable endpoints is an explicit registry built at
//! construction time. Names and parameters are checked during resolution,
//! so a typo never reaches the network.

use std::collections::HashMap;
use std::fmt;

use reqwest::Method as HttpMethod;
use searchtap_domain::constants::API_PATH_PREFIX;
use searchtap_domain::{Method, Params, Resource};
use serde_json::Value;
use url::Url;

use super::errors::ApiError;
use crate::http::{HttpClient, RawResponse, TransportError};

/// Standard parameters every method accepts
const COMMON_QUERY_PARAMS: [&str; 2] = ["fields", "quotaUser"];

/// Name of the parameter carrying a JSON request body
const BODY_PARAM: &str = "body";

/// Static description of one remote method
#[derive(Debug, Clone, Copy)]
struct Endpoint {
    http_method: Verb,
    /// Path below the API prefix, `{name}` marks a path parameter
    path: &'static str,
    path_params: &'static [&'static str],
    query_params: &'static [&'static str],
    takes_body: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Get,
    Post,
}

const ENDPOINTS: [(Resource, Method, Endpoint); 5] = [
    (
        Resource::Sites,
        Method::List,
        Endpoint {
            http_method: Verb::Get,
            path: "/sites",
            path_params: &[],
            query_params: &[],
            takes_body: false,
        },
    ),
    (
        Resource::Sites,
        Method::Get,
        Endpoint {
            http_method: Verb::Get,
            path: "/sites/{siteUrl}",
            path_params: &["siteUrl"],
            query_params: &[],
            takes_body: false,
        },
    ),
    (
        Resource::Sitemaps,
        Method::List,
        Endpoint {
            http_method: Verb::Get,
            path: "/sites/{siteUrl}/sitemaps",
            path_params: &["siteUrl"],
            query_params: &["sitemapIndex"],
            takes_body: false,
        },
    ),
    (
        Resource::Sitemaps,
        Method::Get,
        Endpoint {
            http_method: Verb::Get,
            path: "/sites/{siteUrl}/sitemaps/{feedpath}",
            path_params: &["siteUrl", "feedpath"],
            query_params: &[],
            takes_body: false,
        },
    ),
    (
        Resource::SearchAnalytics,
        Method::Query,
        Endpoint {
            http_method: Verb::Post,
            path: "/sites/{siteUrl}/searchAnalytics/query",
            path_params: &["siteUrl"],
            query_params: &[],
            takes_body: true,
        },
    ),
];

/// Fully validated request, ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub resource: Resource,
    pub method: Method,
    pub http_method: HttpMethod,
    /// Path including the API prefix, path parameters percent-encoded
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.method)
    }
}

/// Registry of callable methods plus the transport to call them with
#[derive(Debug, Clone)]
pub struct ResourceResolver {
    http: HttpClient,
    base_url: String,
    registry: HashMap<(Resource, Method), Endpoint>,
}

impl ResourceResolver {
    pub fn new(http: HttpClient, base_url: &str) -> Result<Self, ApiError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| ApiError::Config(format!("invalid base_url '{base_url}': {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(ApiError::Config(format!("base_url '{base_url}' cannot be a base")));
        }

        let registry = ENDPOINTS.into_iter().map(|(r, m, e)| ((r, m), e)).collect();
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string(), registry })
    }

    /// Whether `resource.method` is callable
    pub fn supports(&self, resource: Resource, method: Method) -> bool {
        self.registry.contains_key(&(resource, method))
    }

    /// Look up the method and validate `params` against it
    pub fn resolve(
        &self,
        resource_name: &str,
        method_name: &str,
        params: &Params,
    ) -> Result<Invocation, ApiError> {
        let unknown = || ApiError::UnknownMethod {
            resource: resource_name.to_string(),
            method: method_name.to_string(),
        };
        let resource: Resource = resource_name.parse().map_err(|_| unknown())?;
        let method: Method = method_name.parse().map_err(|_| unknown())?;
        let endpoint = self.registry.get(&(resource, method)).ok_or_else(unknown)?;
        let call = format!("{resource}.{method}");

        for name in params.keys() {
            let known = endpoint.path_params.contains(&name.as_str())
                || endpoint.query_params.contains(&name.as_str())
                || COMMON_QUERY_PARAMS.contains(&name.as_str())
                || (endpoint.takes_body && name == BODY_PARAM);
            if !known {
                return Err(ApiError::InvalidParameters(format!(
                    "{call}: unexpected parameter '{name}'"
                )));
            }
        }

        let mut path = format!("{API_PATH_PREFIX}{}", endpoint.path);
        for name in endpoint.path_params {
            let value = match params.get(*name) {
                Some(Value::String(s)) if !s.is_empty() => s,
                Some(_) => {
                    return Err(ApiError::InvalidParameters(format!(
                        "{call}: parameter '{name}' must be a non-empty string"
                    )))
                }
                None => {
                    return Err(ApiError::InvalidParameters(format!(
                        "{call}: missing required parameter '{name}'"
                    )))
                }
            };
            path = path.replace(&format!("{{{name}}}"), &urlencoding::encode(value));
        }

        let mut query = Vec::new();
        for name in endpoint.query_params.iter().chain(COMMON_QUERY_PARAMS.iter()) {
            match params.get(*name) {
                None | Some(Value::Null) => {}
                Some(Value::String(s)) => query.push(((*name).to_string(), s.clone())),
                Some(v @ (Value::Bool(_) | Value::Number(_))) => {
                    query.push(((*name).to_string(), v.to_string()));
                }
                Some(_) => {
                    return Err(ApiError::InvalidParameters(format!(
                        "{call}: parameter '{name}' must be a scalar"
                    )))
                }
            }
        }

        let body = if endpoint.takes_body {
            match params.get(BODY_PARAM) {
                Some(v @ Value::Object(_)) => Some(v.clone()),
                Some(_) => {
                    return Err(ApiError::InvalidParameters(format!(
                        "{call}: '{BODY_PARAM}' must be a JSON object"
                    )))
                }
                None => {
                    return Err(ApiError::InvalidParameters(format!(
                        "{call}: missing required parameter '{BODY_PARAM}'"
                    )))
                }
            }
        } else {
            None
        };

        let http_method = match endpoint.http_method {
            Verb::Get => HttpMethod::GET,
            Verb::Post => HttpMethod::POST,
        };

        Ok(Invocation { resource, method, http_method, path, query, body })
    }

    /// Send the invocation once; any HTTP status comes back as a response
    pub async fn execute(
        &self,
        invocation: &Invocation,
        bearer: &str,
    ) -> Result<RawResponse, TransportError> {
        let url = format!("{}{}", self.base_url, invocation.path);
        let mut request = self
            .http
            .request(invocation.http_method.clone(), url)
            .bearer_auth(bearer)
            .header("Accept", "application/json");

        if !invocation.query.is_empty() {
            request = request.query(&invocation.query);
        }
        if let Some(body) = &invocation.body {
            request = request.json(body);
        }

        self.http.send(request).await
    }
}
