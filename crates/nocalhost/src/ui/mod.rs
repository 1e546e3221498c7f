//! Terminal presentation: spinners and notifications

pub mod notifier;
pub mod spinner;

/// Global flag that overrides the path of `program`
pub fn binary_flag(program: &str) -> &'static str {
    let name = std::path::Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(program);
    if name.starts_with("kubectl") {
        "kubectl"
    } else {
        "nhctl"
    }
}
