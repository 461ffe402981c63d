//! Lenient navigation over fetched JSON documents.

use serde_json::Value;

/// Path from the document root to the market mapping.
pub const MARKETS_PATH: [&str; 4] = ["props", "pageProps", "initialState", "markets"];

/// Walks `path` through nested objects, returning `None` as soon as a segment
/// is missing or the current node is not an object.
pub fn navigate<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(root, |node, segment| node.as_object()?.get(*segment))
}

/// Like [`navigate`], but yields `default` instead of `None`. `null` at the
/// end of the path counts as missing.
pub fn navigate_or_default<'a>(root: &'a Value, path: &[&str], default: &'a Value) -> &'a Value {
    match navigate(root, path) {
        Some(Value::Null) | None => default,
        Some(found) => found,
    }
}
