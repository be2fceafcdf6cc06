//! Process-wide runtime flags
//!
//! Two interpreter-behaviour flags are part of the container contract:
//!
//! - `PYTHONUNBUFFERED` - stdout/stderr are written through without buffering
//! - `PYTHONDONTWRITEBYTECODE` - no compiled bytecode cache files are written
//!
//! They are read once at process entry, exported into the process environment
//! when absent, and never touched again. The image planner uses the same struct
//! for the `ENV` instruction so the image and the launcher agree on names.

use serde::{Deserialize, Serialize};
use std::env;

pub const UNBUFFERED_VAR: &str = "PYTHONUNBUFFERED";
pub const NO_BYTECODE_VAR: &str = "PYTHONDONTWRITEBYTECODE";

/// Snapshot of the runtime flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeEnv {
    /// Output streams are unbuffered
    pub unbuffered_output: bool,
    /// Bytecode cache writes are suppressed
    pub no_bytecode_writes: bool,
}

impl Default for RuntimeEnv {
    fn default() -> Self {
        Self {
            unbuffered_output: true,
            no_bytecode_writes: true,
        }
    }
}

impl RuntimeEnv {
    /// Reads the flags from the current process environment.
    ///
    /// A flag counts as set when the variable is present and non-empty, which
    /// mirrors how the interpreter itself treats them.
    pub fn from_env() -> Self {
        Self {
            unbuffered_output: flag_set(UNBUFFERED_VAR),
            no_bytecode_writes: flag_set(NO_BYTECODE_VAR),
        }
    }

    /// Names of the flags that are not set in the current environment
    pub fn missing() -> Vec<&'static str> {
        [UNBUFFERED_VAR, NO_BYTECODE_VAR]
            .into_iter()
            .filter(|name| !flag_set(name))
            .collect()
    }

    /// Exports both flags as `1` where absent and returns the resulting snapshot.
    ///
    /// Must run before any other thread is spawned (in particular before the
    /// async runtime is built): mutating the environment is not thread-safe.
    pub fn export_defaults() -> Self {
        for name in Self::missing() {
            env::set_var(name, "1");
        }
        Self::from_env()
    }

    /// `ENV` pairs for a container image, in a stable order
    pub fn image_env(&self) -> Vec<(String, String)> {
        let mut vars = Vec::new();
        if self.unbuffered_output {
            vars.push((UNBUFFERED_VAR.to_string(), "1".to_string()));
        }
        if self.no_bytecode_writes {
            vars.push((NO_BYTECODE_VAR.to_string(), "1".to_string()));
        }
        vars
    }
}

fn flag_set(name: &str) -> bool {
    env::var_os(name).map(|v| !v.is_empty()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct EnvGuard {
        key: &'static str,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn unset(key: &'static str) -> Self {
            let old_value = env::var(key).ok();
            env::remove_var(key);
            Self { key, old_value }
        }

        fn set(key: &'static str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self { key, old_value }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(self.key, v),
                None => env::remove_var(self.key),
            }
        }
    }

    #[test]
    #[serial]
    fn test_from_env_reads_both_flags() {
        let _a = EnvGuard::set(UNBUFFERED_VAR, "1");
        let _b = EnvGuard::unset(NO_BYTECODE_VAR);

        let flags = RuntimeEnv::from_env();
        assert!(flags.unbuffered_output);
        assert!(!flags.no_bytecode_writes);
        assert_eq!(RuntimeEnv::missing(), vec![NO_BYTECODE_VAR]);
    }

    #[test]
    #[serial]
    fn test_empty_value_counts_as_unset() {
        let _a = EnvGuard::set(UNBUFFERED_VAR, "");
        let _b = EnvGuard::set(NO_BYTECODE_VAR, "1");

        assert!(!RuntimeEnv::from_env().unbuffered_output);
    }

    #[test]
    #[serial]
    fn test_export_defaults_fills_missing_and_keeps_existing() {
        let _a = EnvGuard::unset(UNBUFFERED_VAR);
        let _b = EnvGuard::set(NO_BYTECODE_VAR, "yes");

        let flags = RuntimeEnv::export_defaults();
        assert_eq!(flags, RuntimeEnv::default());
        assert_eq!(env::var(UNBUFFERED_VAR).unwrap(), "1");
        assert_eq!(env::var(NO_BYTECODE_VAR).unwrap(), "yes");
        assert!(RuntimeEnv::missing().is_empty());
    }

    #[test]
    fn test_image_env_order() {
        let vars = RuntimeEnv::default().image_env();
        assert_eq!(
            vars,
            vec![
                ("PYTHONUNBUFFERED".to_string(), "1".to_string()),
                ("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_image_env_skips_disabled_flags() {
        let flags = RuntimeEnv {
            unbuffered_output: false,
            no_bytecode_writes: true,
        };
        assert_eq!(flags.image_env().len(), 1);
        assert_eq!(flags.image_env()[0].0, NO_BYTECODE_VAR);
    }
}
