/// Settings for the host C toolchain that turns CPU units into shared
/// libraries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainConfig {
    /// Compiler executable, looked up on `PATH`.
    pub compiler: String,
    /// `-O` level, clamped to `0..=3`.
    pub opt_level: u8,
    /// Extra flags placed before the source file.
    pub extra_flags: Vec<String>,
    /// Keep the generated sources and libraries after the toolchain is dropped.
    pub keep_artifacts: bool,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        ToolchainConfig {
            compiler: "cc".to_string(),
            opt_level: 2,
            extra_flags: Vec::new(),
            keep_artifacts: false,
        }
    }
}

impl ToolchainConfig {
    /// Read `TC_CC` (then `CC`), `TC_OPT_LEVEL`, `TC_CFLAGS` and
    /// `TC_KEEP_ARTIFACTS` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = ToolchainConfig::default();

        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(cc) = non_empty("TC_CC").or_else(|| non_empty("CC")) {
            config.compiler = cc.trim().to_string();
        }
        if let Some(level) = non_empty("TC_OPT_LEVEL") {
            match level.trim().parse::<u8>() {
                Ok(n) => config.opt_level = n.min(3),
                Err(_) => log::warn!("ignoring TC_OPT_LEVEL={level:?}, expected 0..3"),
            }
        }
        if let Some(flags) = lookup("TC_CFLAGS") {
            config.extra_flags = flags.split_whitespace().map(str::to_string).collect();
        }
        if let Some(keep) = lookup("TC_KEEP_ARTIFACTS") {
            config.keep_artifacts = parse_bool(&keep);
        }
        config
    }
}

pub(crate) fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ToolchainConfig::from_lookup(lookup(&[]));
        assert_eq!(config, ToolchainConfig::default());
        assert_eq!(config.compiler, "cc");
        assert_eq!(config.opt_level, 2);
    }

    #[test]
    fn test_compiler_precedence() {
        let config = ToolchainConfig::from_lookup(lookup(&[("CC", "gcc"), ("TC_CC", "clang")]));
        assert_eq!(config.compiler, "clang");
        let config = ToolchainConfig::from_lookup(lookup(&[("CC", "gcc"), ("TC_CC", " ")]));
        assert_eq!(config.compiler, "gcc");
    }

    #[test]
    fn test_flags_and_levels() {
        let config = ToolchainConfig::from_lookup(lookup(&[
            ("TC_OPT_LEVEL", "7"),
            ("TC_CFLAGS", " -march=native  -ffast-math "),
            ("TC_KEEP_ARTIFACTS", "Yes"),
        ]));
        assert_eq!(config.opt_level, 3);
        assert_eq!(config.extra_flags, vec!["-march=native", "-ffast-math"]);
        assert!(config.keep_artifacts);

        let config = ToolchainConfig::from_lookup(lookup(&[("TC_OPT_LEVEL", "fast")]));
        assert_eq!(config.opt_level, 2);
    }

    #[test]
    fn test_parse_bool() {
        for v in ["1", "true", "YES", " on "] {
            assert!(parse_bool(v), "{v}");
        }
        for v in ["0", "false", "off", ""] {
            assert!(!parse_bool(v), "{v}");
        }
    }
}
