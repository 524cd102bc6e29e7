//! Call and response types shared between the client and its callers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::TapError;

/// Named call parameters, as the remote API's discovery document names them
pub type Params = Map<String, Value>;

/// Decoded JSON object returned by a successful call
pub type ApiResponse = Map<String, Value>;

/// Remote resource collections reachable through the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Sites,
    Sitemaps,
    #[serde(rename = "searchanalytics")]
    SearchAnalytics,
}

impl Resource {
    pub const ALL: [Self; 3] = [Self::Sites, Self::Sitemaps, Self::SearchAnalytics];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sites => "sites",
            Self::Sitemaps => "sitemaps",
            Self::SearchAnalytics => "searchanalytics",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = TapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| TapError::InvalidInput(format!("unknown resource '{s}'")))
    }
}

/// Operations a resource may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    List,
    Get,
    Query,
}

impl Method {
    pub const ALL: [Self; 3] = [Self::List, Self::Get, Self::Query];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Get => "get",
            Self::Query => "query",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = TapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| TapError::InvalidInput(format!("unknown method '{s}'")))
    }
}

/// One logical call: which method on which resource, with which parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub method: String,
    pub resource: String,
    #[serde(default)]
    pub params: Params,
}

impl CallRequest {
    pub fn new(method: impl Into<String>, resource: impl Into<String>) -> Self {
        Self { method: method.into(), resource: resource.into(), params: Params::new() }
    }

    /// Add one parameter
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Replace all parameters
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

impl fmt::Display for CallRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.method)
    }
}
