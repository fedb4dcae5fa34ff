//! Routing tree: literal and parameter segments plus terminal servants.
//!
//! The tree is built once, before the server starts, and is read-only while
//! serving. Resolution walks the tree depth-first, preferring deeper
//! matches, with literal children tried before parameter children and
//! servant terminals tried last so specific routes registered beneath the
//! same prefix win.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::Method;

use crate::static_files::FileServant;
use crate::zip_files::ZipServant;

/// Errors raised while registering or resolving routes.
#[derive(Debug)]
pub enum RouteError {
    /// Resolution was asked for an empty path.
    EmptyPath,
    /// A registered segment contained a `/`.
    SlashInSegment(String),
    /// Two `:name` segments on one path share a name.
    DuplicateParam(String),
    /// A route or servant was attached beneath a terminal servant node.
    ChildBeneathServant(String),
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::EmptyPath => f.write_str("path cannot be empty"),
            RouteError::SlashInSegment(seg) => {
                write!(f, "segment cannot contain slashes: {seg:?}")
            }
            RouteError::DuplicateParam(name) => {
                write!(f, "duplicate path parameter: {name:?}")
            }
            RouteError::ChildBeneathServant(seg) => {
                write!(f, "cannot register beneath terminal servant at {seg:?}")
            }
        }
    }
}

impl std::error::Error for RouteError {}

/// How a node's own segment matches an incoming segment.
#[derive(Debug, Clone)]
enum Matcher {
    /// Case-insensitive literal comparison.
    Literal,
    /// Matches any non-empty segment, capturing it under the name.
    Param(String),
}

/// Terminal servant attached to a node; consumes the entire path tail.
#[derive(Clone)]
enum Servant {
    File(Arc<FileServant>),
    Zip(Arc<ZipServant>),
}

/// Where a resolved request should be dispatched.
#[derive(Clone)]
pub enum RouteTarget {
    /// A registered application handler, by dispatcher name.
    Handler(String),
    /// A directory-backed static servant.
    File(Arc<FileServant>),
    /// An archive-backed static servant.
    Zip(Arc<ZipServant>),
}

impl fmt::Debug for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteTarget::Handler(name) => write!(f, "Handler({name})"),
            RouteTarget::File(_) => f.write_str("File"),
            RouteTarget::Zip(_) => f.write_str("Zip"),
        }
    }
}

/// A successful resolution: the target, captured parameters, and the
/// unconsumed path tail.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub target: RouteTarget,
    pub path_params: HashMap<String, String>,
    /// Path suffix beyond the matched route, `/`-joined, empty when fully
    /// consumed.
    pub remaining: String,
}

struct Node {
    segment: String,
    matcher: Matcher,
    servant: Option<Servant>,
    handlers: HashMap<Method, String>,
    children: Vec<Node>,
}

impl Node {
    fn new(segment: &str) -> Self {
        let matcher = match segment.strip_prefix(':') {
            Some(name) => Matcher::Param(name.to_string()),
            None => Matcher::Literal,
        };
        Node {
            segment: segment.to_string(),
            matcher,
            servant: None,
            handlers: HashMap::new(),
            children: Vec::new(),
        }
    }

    fn is_param(&self) -> bool {
        matches!(self.matcher, Matcher::Param(_))
    }

    fn accepts(&self, segment: &str) -> bool {
        match &self.matcher {
            Matcher::Literal => self.segment.eq_ignore_ascii_case(segment),
            Matcher::Param(_) => !segment.is_empty(),
        }
    }
}

/// The declared route set.
///
/// Owned exclusively by the server; built through [`RouteTree::register`],
/// [`RouteTree::register_file`] and [`RouteTree::register_zip`], then
/// treated as immutable once serving begins.
pub struct RouteTree {
    root: Node,
}

impl Default for RouteTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTree {
    /// An empty tree; the root has an empty segment and no handler.
    pub fn new() -> Self {
        RouteTree {
            root: Node::new(""),
        }
    }

    fn split_segments(path: &str) -> Vec<&str> {
        let mut segments: Vec<&str> = path.split('/').collect();
        if segments.first() == Some(&"") {
            segments.remove(0);
        }
        segments
    }

    /// Walk (creating as needed) to the node for `path` and return it.
    fn node_for_path<'a>(root: &'a mut Node, path: &str) -> Result<&'a mut Node, RouteError> {
        let mut node = root;
        let mut seen_params: Vec<String> = Vec::new();
        for segment in Self::split_segments(path) {
            if segment.contains('/') {
                return Err(RouteError::SlashInSegment(segment.to_string()));
            }
            if node.servant.is_some() {
                return Err(RouteError::ChildBeneathServant(node.segment.clone()));
            }
            if let Some(name) = segment.strip_prefix(':') {
                if seen_params.iter().any(|p| p == name) {
                    return Err(RouteError::DuplicateParam(name.to_string()));
                }
                seen_params.push(name.to_string());
            }
            let pos = node.children.iter().position(|c| c.segment == segment);
            node = match pos {
                Some(i) => &mut node.children[i],
                None => {
                    node.children.push(Node::new(segment));
                    node.children.last_mut().expect("just pushed")
                }
            };
        }
        Ok(node)
    }

    /// Bind `method` on `path` to the named handler, creating intermediate
    /// literal/parameter nodes as needed. Re-binding an existing
    /// method+path replaces the previous handler.
    pub fn register(&mut self, path: &str, method: Method, handler: &str) -> Result<(), RouteError> {
        let node = Self::node_for_path(&mut self.root, path)?;
        node.handlers.insert(method, handler.to_string());
        Ok(())
    }

    /// Attach a directory-backed terminal servant at `path`.
    pub fn register_file(&mut self, path: &str, servant: FileServant) -> Result<(), RouteError> {
        let node = Self::node_for_path(&mut self.root, path)?;
        node.servant = Some(Servant::File(Arc::new(servant)));
        Ok(())
    }

    /// Attach an archive-backed terminal servant at `path`.
    pub fn register_zip(&mut self, path: &str, servant: ZipServant) -> Result<(), RouteError> {
        let node = Self::node_for_path(&mut self.root, path)?;
        node.servant = Some(Servant::Zip(Arc::new(servant)));
        Ok(())
    }

    /// Resolve `(method, path)` to a target, captured parameters, and the
    /// remaining tail. Returns `Ok(None)` on a routing miss.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<Option<Resolution>, RouteError> {
        if path.is_empty() {
            return Err(RouteError::EmptyPath);
        }
        let segments = Self::split_segments(path);
        let mut params = HashMap::new();
        Ok(Self::resolve_at(
            &self.root, &segments, 0, method, &mut params,
        ))
    }

    /// All registered bindings as display strings, e.g. `GET /v/:name` or
    /// `ZIP /static/*`. Useful for startup logging and debugging.
    pub fn route_patterns(&self) -> Vec<String> {
        let mut out = Vec::new();
        Self::collect_patterns(&self.root, "", &mut out);
        out
    }

    fn collect_patterns(node: &Node, prefix: &str, out: &mut Vec<String>) {
        for method in node.handlers.keys() {
            let path = if prefix.is_empty() { "/" } else { prefix };
            out.push(format!("{method} {path}"));
        }
        match &node.servant {
            Some(Servant::File(_)) => out.push(format!("FILE {prefix}/*")),
            Some(Servant::Zip(_)) => out.push(format!("ZIP {prefix}/*")),
            None => {}
        }
        for child in &node.children {
            let child_prefix = format!("{prefix}/{}", child.segment);
            Self::collect_patterns(child, &child_prefix, out);
        }
    }

    fn resolve_at(
        node: &Node,
        segments: &[&str],
        index: usize,
        method: &Method,
        params: &mut HashMap<String, String>,
    ) -> Option<Resolution> {
        if index < segments.len() {
            let segment = segments[index];
            // Literal children take precedence over parameter children at
            // the same depth, regardless of insertion order.
            for child in node.children.iter().filter(|c| !c.is_param()) {
                if child.accepts(segment) {
                    if let Some(found) =
                        Self::resolve_at(child, segments, index + 1, method, params)
                    {
                        return Some(found);
                    }
                }
            }
            for child in node.children.iter().filter(|c| c.is_param()) {
                if child.accepts(segment) {
                    if let Matcher::Param(name) = &child.matcher {
                        params.insert(name.clone(), segment.to_string());
                        if let Some(found) =
                            Self::resolve_at(child, segments, index + 1, method, params)
                        {
                            return Some(found);
                        }
                        // Backtrack the capture when the descent fails.
                        params.remove(name);
                    }
                }
            }
        }
        // Servants are tried after deeper descent so specific routes
        // registered beneath the same prefix win; they accept only GET and
        // consume the whole tail.
        if let Some(servant) = &node.servant {
            if *method == Method::GET {
                let target = match servant {
                    Servant::File(s) => RouteTarget::File(Arc::clone(s)),
                    Servant::Zip(s) => RouteTarget::Zip(Arc::clone(s)),
                };
                return Some(Resolution {
                    target,
                    path_params: params.clone(),
                    remaining: segments[index..].join("/"),
                });
            }
        }
        if let Some(handler) = node.handlers.get(method) {
            return Some(Resolution {
                target: RouteTarget::Handler(handler.clone()),
                path_params: params.clone(),
                remaining: segments[index..].join("/"),
            });
        }
        None
    }
}
