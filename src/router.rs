use std::collections::HashMap;

use axum::http::Method;

use crate::errors::{BackendError, Result};

/// Prefix marking a named parameter segment in a route pattern, e.g. `/:accountId`.
pub const PARAM_PREFIX: char = ':';

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

impl Segment {
    fn parse(raw: &str) -> Self {
        match raw.strip_prefix(PARAM_PREFIX) {
            Some(name) => Segment::Param(name.to_string()),
            None => Segment::Literal(raw.to_string()),
        }
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Parameter names do not distinguish routes, so they are erased.
fn normalize(segments: &[Segment]) -> String {
    let parts: Vec<&str> = segments
        .iter()
        .map(|s| match s {
            Segment::Literal(lit) => lit.as_str(),
            Segment::Param(_) => ":",
        })
        .collect();
    format!("/{}", parts.join("/"))
}

#[derive(Debug, Clone)]
struct Route<H> {
    verb: Method,
    pattern: String,
    normalized: String,
    segments: Vec<Segment>,
    resource: String,
    action: String,
    handler: H,
}

/// Result of resolving a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a, H> {
    pub handler: &'a H,
    pub pattern: &'a str,
    pub resource: &'a str,
    pub action: &'a str,
    pub params: HashMap<String, String>,
}

/// Verb + path pattern table. Built at startup, read-only afterwards.
#[derive(Debug, Clone)]
pub struct Router<H> {
    routes: Vec<Route<H>>,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<H> Router<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(
        &mut self,
        verb: Method,
        pattern: &str,
        handler: H,
        resource: &str,
        action: &str,
    ) -> Result<()> {
        let segments: Vec<Segment> = split_path(pattern).map(Segment::parse).collect();
        let normalized = normalize(&segments);

        if self
            .routes
            .iter()
            .any(|r| r.verb == verb && r.normalized == normalized)
        {
            return Err(BackendError::DuplicateUrl(format!("{verb} {pattern}")));
        }

        self.routes.push(Route {
            verb,
            pattern: pattern.to_string(),
            normalized,
            segments,
            resource: resource.to_string(),
            action: action.to_string(),
            handler,
        });
        Ok(())
    }

    /// First attached route matching `verb` and `path` wins.
    pub fn resolve(&self, verb: &Method, path: &str) -> Option<RouteMatch<'_, H>> {
        let incoming: Vec<&str> = split_path(path).collect();

        self.routes
            .iter()
            .filter(|route| route.verb == *verb && route.segments.len() == incoming.len())
            .find_map(|route| {
                let mut params = HashMap::new();
                for (segment, value) in route.segments.iter().zip(&incoming) {
                    match segment {
                        Segment::Literal(lit) if lit == value => {}
                        Segment::Literal(_) => return None,
                        Segment::Param(name) => {
                            params.insert(name.clone(), (*value).to_string());
                        }
                    }
                }
                Some(RouteMatch {
                    handler: &route.handler,
                    pattern: &route.pattern,
                    resource: &route.resource,
                    action: &route.action,
                    params,
                })
            })
    }

    /// (verb, pattern, resource, action) for every attached route, in attach order.
    pub fn routes(&self) -> impl Iterator<Item = (&Method, &str, &str, &str)> {
        self.routes.iter().map(|r| {
            (
                &r.verb,
                r.pattern.as_str(),
                r.resource.as_str(),
                r.action.as_str(),
            )
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
