//! Project configuration: the compose file plus the user's `dcmon.lua`.
//!
//! A `dcmon.lua` looks like:
//!
//! ```lua
//! yml = "../docker-compose.yml"     -- optional compose file override
//!
//! containers = {
//!   noisy   = { hide = true },
//!   web     = {
//!     filter = function(msg)
//!       if msg:find("healthcheck") then return nil end
//!       return msg
//!     end,
//!   },
//! }
//!
//! views = {
//!   errors = function(container, msg)
//!     if msg:find("ERROR") then return "errors" end
//!   end,
//! }
//! ```
//!
//! The script runs once at startup inside the embedded interpreter;
//! the per-container `filter` functions and named `views` stay live as
//! [`FuncRef`]s and are called for every log line afterwards.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::fileutil;
use crate::script::{FuncRef, ScriptEngine, ScriptError, Value};

// ── ConfigError ───────────────────────────────────────────────────────────

/// A fatal problem while resolving or loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// No compose file could be located.
    ComposeNotFound(PathBuf),
    /// The compose file failed validation or could not be read.
    Io(io::Error),
    /// The configuration script failed to load or run.
    Script(ScriptError),
    /// The script's `yml` override contradicts an explicitly given
    /// compose file.
    ComposeMismatch { script_says: PathBuf, given: PathBuf },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ComposeNotFound(p) => {
                write!(f, "could not find docker-compose.yml near {}", p.display())
            }
            ConfigError::Io(e) => write!(f, "{e}"),
            ConfigError::Script(e) => write!(f, "error in dcmon.lua: {e}"),
            ConfigError::ComposeMismatch { script_says, given } => write!(
                f,
                "dcmon.lua \"yml\" ({}) does not match {}",
                script_says.display(),
                given.display()
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<ScriptError> for ConfigError {
    fn from(e: ScriptError) -> Self {
        ConfigError::Script(e)
    }
}

// ── MonConfig ─────────────────────────────────────────────────────────────

/// Loaded project configuration.
///
/// Owns the [`ScriptEngine`] so that the filter and view handles stay
/// callable for the life of the config.
pub struct MonConfig {
    pub compose_file: PathBuf,
    pub script_file: Option<PathBuf>,
    hidden: HashSet<String>,
    filters: HashMap<String, FuncRef>,
    views: HashMap<String, FuncRef>,
    engine: Option<ScriptEngine>,
}

impl MonConfig {
    /// Resolve configuration starting from `start` (a directory, a
    /// compose file, or a `dcmon.lua`).
    ///
    /// When a `dcmon.lua` is found it is evaluated and may name the
    /// compose file via its `yml` global; otherwise the compose file is
    /// discovered by walking up from `start`.
    pub fn load(start: &Path) -> Result<Self, ConfigError> {
        Self::load_inner(start, true)
    }

    /// Like [`load`](Self::load), but skip any `dcmon.lua` (the
    /// `--no-lua` flag).
    pub fn load_without_script(start: &Path) -> Result<Self, ConfigError> {
        Self::load_inner(start, false)
    }

    fn load_inner(start: &Path, use_script: bool) -> Result<Self, ConfigError> {
        let explicit_compose = (start.is_file()
            && start.extension().is_some_and(|e| e == "yml" || e == "yaml"))
        .then(|| start.to_path_buf());

        let script_file = if use_script {
            fileutil::find_config_script(start)
        } else {
            None
        };

        let mut config = Self {
            compose_file: PathBuf::new(),
            script_file: script_file.clone(),
            hidden: HashSet::new(),
            filters: HashMap::new(),
            views: HashMap::new(),
            engine: None,
        };

        let script_compose = match &script_file {
            Some(path) => config.load_script(path)?,
            None => None,
        };

        let compose_file = match (script_compose, explicit_compose) {
            (Some(from_script), Some(given)) => {
                let given = given.canonicalize().unwrap_or(given);
                if from_script != given {
                    return Err(ConfigError::ComposeMismatch {
                        script_says: from_script,
                        given,
                    });
                }
                from_script
            }
            (Some(from_script), None) => from_script,
            (None, Some(given)) => given,
            (None, None) => fileutil::find_docker_compose(start)
                .ok_or_else(|| ConfigError::ComposeNotFound(start.to_path_buf()))?,
        };

        config.compose_file = compose_file;
        Ok(config)
    }

    /// Evaluate the configuration script and collect its declarations.
    /// Returns the compose file named by the `yml` global, if any.
    fn load_script(&mut self, path: &Path) -> Result<Option<PathBuf>, ConfigError> {
        let engine = ScriptEngine::new()?;
        let file = std::fs::File::open(path)?;
        engine.eval_reader(file, &path.display().to_string())?;

        // `yml` is resolved relative to the script's directory.
        let yml = match engine.get("yml")? {
            Value::Str(s) if !s.is_empty() => {
                let base = path.parent().unwrap_or(Path::new("."));
                let resolved = base.join(&s);
                Some(resolved.canonicalize().unwrap_or(resolved))
            }
            _ => None,
        };

        if let Value::Table(containers) = engine.get("containers")? {
            // Pin the declaration tables in the engine's private
            // registry so they outlive any script-side reassignment.
            engine.registry().set("containers", containers.clone())?;
            for key in containers.keys()? {
                let Value::Str(name) = key else { continue };
                let Value::Table(entry) = containers.get(name.as_str())? else {
                    continue;
                };
                if entry.get("hide")?.is_truthy() {
                    self.hidden.insert(name);
                    continue;
                }
                if let Value::Func(filter) = entry.get("filter")? {
                    self.filters.insert(name, filter);
                }
            }
        }

        if let Value::Table(views) = engine.get("views")? {
            engine.registry().set("views", views.clone())?;
            for key in views.keys()? {
                let Value::Str(name) = key else { continue };
                if let Value::Func(view) = views.get(name.as_str())? {
                    self.views.insert(name, view);
                }
            }
        }

        self.engine = Some(engine);
        Ok(yml)
    }

    /// Containers the configuration hides entirely.
    pub fn is_hidden(&self, container: &str) -> bool {
        self.hidden.contains(container)
    }

    /// The filter callable for `container`, if one was declared.
    pub fn log_filter(&self, container: &str) -> Option<&FuncRef> {
        self.filters.get(container)
    }

    /// The named view callable, if declared.
    pub fn view(&self, name: &str) -> Option<&FuncRef> {
        self.views.get(name)
    }

    /// Declared view names, sorted.
    pub fn view_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.views.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Whether a configuration script was loaded.
    pub fn has_script(&self) -> bool {
        self.engine.is_some()
    }
}

impl fmt::Debug for MonConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonConfig")
            .field("compose_file", &self.compose_file)
            .field("script_file", &self.script_file)
            .field("hidden", &self.hidden)
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .field("views", &self.views.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
