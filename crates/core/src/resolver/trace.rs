//! Resolution trace tree
//!
//! Debug entry points record every node they visit as a tree of labels.
//! Rendering beyond plain indented text is left to the caller.

use std::fmt::{self, Write as _};

use serde::Serialize;

/// One visited node with its ordered children
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TraceNode {
    pub label: String,
    pub children: Vec<TraceNode>,
}

impl TraceNode {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            children: Vec::new(),
        }
    }

    pub fn push(&mut self, child: TraceNode) {
        self.children.push(child);
    }

    /// Check if this node or any descendant has a label containing `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.label.contains(needle) || self.children.iter().any(|c| c.contains(needle))
    }

    /// Render as an indented tree, two spaces per level
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let _ = writeln!(out, "{:indent$}{}", "", self.label, indent = depth * 2);
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
    }
}

impl fmt::Display for TraceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Add a leaf to an optional trace
pub(crate) fn note<F>(trace: &mut Option<&mut TraceNode>, label: F)
where
    F: FnOnce() -> String,
{
    if let Some(node) = trace.as_deref_mut() {
        node.push(TraceNode::new(label()));
    }
}

/// Start a child node when tracing is enabled
pub(crate) fn open<F>(trace: &Option<&mut TraceNode>, label: F) -> Option<TraceNode>
where
    F: FnOnce() -> String,
{
    trace.as_ref().map(|_| TraceNode::new(label()))
}

/// Attach a finished child node
pub(crate) fn attach(trace: &mut Option<&mut TraceNode>, child: Option<TraceNode>) {
    if let (Some(node), Some(child)) = (trace.as_deref_mut(), child) {
        node.push(child);
    }
}
