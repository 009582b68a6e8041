mod styling;
mod summary;
mod tables;

pub use styling::{dim, magenta_bold};
pub use summary::{print_discovery_summary, print_quality_summary};

/// Prints the `Qualens` banner to stderr.
///
/// Displays the tool name, version, and description at the start of execution.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🔍 Qualens"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("CI Test Quality Indexer")
    );
}
