//! Route selection: which routes become tools.
//!
//! A [`RouteMap`] is an ordered list of rules. The first rule whose methods and path pattern match
//! a route decides its fate; a route no rule matches becomes a tool.

use crate::error::{OpenApiToolsError, Result};
use crate::mappings::ToolMappings;
use crate::routes::HttpRoute;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RouteAction {
    #[default]
    Tool,
    Exclude,
}

/// Route rule as written in the service configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouteRuleConfig {
    /// Methods this rule applies to (case-insensitive). Empty matches any method.
    #[serde(default)]
    pub methods: Vec<String>,
    /// Regex matched against the path template. Defaults to any path.
    #[serde(default = "match_all")]
    pub pattern: String,
    pub action: RouteAction,
}

fn match_all() -> String {
    ".*".to_string()
}

#[derive(Debug, Clone)]
enum PathPattern {
    Any,
    /// Literal path template, braces included.
    Exact(String),
    Regex(Regex),
}

impl PathPattern {
    fn is_match(&self, path: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(p) => p == path,
            Self::Regex(re) => re.is_match(path),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteRule {
    /// Lowercase methods; empty matches any.
    methods: Vec<String>,
    pattern: PathPattern,
    action: RouteAction,
}

impl RouteRule {
    /// # Errors
    ///
    /// Returns an error if `pattern` is not a valid regex.
    pub fn new(methods: &[String], pattern: &str, action: RouteAction) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            OpenApiToolsError::Config(format!("Invalid route pattern '{pattern}': {e}"))
        })?;
        Ok(Self {
            methods: methods.iter().map(|m| m.to_ascii_lowercase()).collect(),
            pattern: PathPattern::Regex(pattern),
            action,
        })
    }

    /// Rule matching exactly one method and path template.
    #[must_use]
    pub fn exact(method: &str, path: &str, action: RouteAction) -> Self {
        Self {
            methods: vec![method.to_ascii_lowercase()],
            pattern: PathPattern::Exact(path.to_string()),
            action,
        }
    }

    /// Rule matching every route.
    #[must_use]
    pub fn catch_all(action: RouteAction) -> Self {
        Self {
            methods: Vec::new(),
            pattern: PathPattern::Any,
            action,
        }
    }

    #[must_use]
    pub fn matches(&self, route: &HttpRoute) -> bool {
        (self.methods.is_empty() || self.methods.iter().any(|m| *m == route.method))
            && self.pattern.is_match(&route.path)
    }

    #[must_use]
    pub fn action(&self) -> RouteAction {
        self.action
    }
}

impl TryFrom<&RouteRuleConfig> for RouteRule {
    type Error = OpenApiToolsError;

    fn try_from(cfg: &RouteRuleConfig) -> Result<Self> {
        Self::new(&cfg.methods, &cfg.pattern, cfg.action)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RouteMap {
    rules: Vec<RouteRule>,
}

impl RouteMap {
    /// Expose every route.
    #[must_use]
    pub fn expose_all() -> Self {
        Self::default()
    }

    /// Expose exactly the routes whose operationId appears in `mappings`.
    ///
    /// One exact rule is emitted per mapped route, followed by a catch-all exclusion.
    #[must_use]
    pub fn from_mappings(routes: &[HttpRoute], mappings: &ToolMappings) -> Self {
        let mut rules: Vec<RouteRule> = routes
            .iter()
            .filter(|r| r.operation_id.as_deref().is_some_and(|id| mappings.contains(id)))
            .map(|r| RouteRule::exact(&r.method, &r.path, RouteAction::Tool))
            .collect();
        rules.push(RouteRule::catch_all(RouteAction::Exclude));
        Self { rules }
    }

    /// Compile configured rules.
    ///
    /// # Errors
    ///
    /// Returns an error if any rule pattern is not a valid regex.
    pub fn from_config(rules: &[RouteRuleConfig]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(RouteRule::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Evaluate `self` first, then `other`.
    #[must_use]
    pub fn then(mut self, other: RouteMap) -> Self {
        self.rules.extend(other.rules);
        self
    }

    #[must_use]
    pub fn action_for(&self, route: &HttpRoute) -> RouteAction {
        self.rules
            .iter()
            .find(|r| r.matches(route))
            .map_or(RouteAction::Tool, RouteRule::action)
    }

    #[must_use]
    pub fn is_selected(&self, route: &HttpRoute) -> bool {
        self.action_for(route) == RouteAction::Tool
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
