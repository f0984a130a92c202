//! Version strings for the CLI surface.

use itertools::Itertools;

/// Protocol adapters compiled into this build, in CLI spelling. The first
/// entry is the default.
pub const ADAPTERS: &[&str] = &["dap", "mi", "mi2", "mi3", "mi4"];

/// Bare semver string.
pub fn short() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Single-line product banner.
pub fn line() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), short())
}

/// Multi-line block printed by `--version`.
pub fn block() -> String {
    format!(
        "{banner}\nadapters: {adapters}\nhost: {os}/{arch}\n",
        banner = line(),
        adapters = ADAPTERS.iter().join(", "),
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_block_lists_adapters() {
        let block = block();
        assert!(block.starts_with(&line()));
        assert!(block.contains("dap, mi, mi2, mi3, mi4"));
    }
}
