//! Stable timing names derived from Rust types
//!
//! Handy for naming a step after the handler or service type that runs it,
//! without dragging volatile data (ids, arguments) into the name.

/// Full path of `T`, with generic arguments shortened to their last segment
///
/// ```
/// struct Handler<T>(T);
///
/// let name = liveprof::naming::type_profiler_name::<Handler<String>>();
/// assert!(name.ends_with("Handler<String>"));
/// ```
#[must_use]
pub fn type_profiler_name<T: ?Sized>() -> String {
    shorten_generic_args(std::any::type_name::<T>())
}

fn shorten_generic_args(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut path = String::new();
    let mut depth = 0usize;
    let mut prev = '\0';

    for c in full.chars() {
        if c.is_alphanumeric() || c == '_' || c == ':' {
            path.push(c);
            prev = c;
            continue;
        }
        flush_path(&mut out, &mut path, depth);
        match c {
            '<' => depth += 1,
            // `->` in fn signatures does not close a generic list
            '>' if prev != '-' => depth = depth.saturating_sub(1),
            _ => {}
        }
        out.push(c);
        prev = c;
    }
    flush_path(&mut out, &mut path, depth);
    out
}

fn flush_path(out: &mut String, path: &mut String, depth: usize) {
    if depth == 0 {
        out.push_str(path);
    } else {
        out.push_str(path.rsplit("::").next().unwrap_or_default());
    }
    path.clear();
}
