//! YAML loading with custom tags
//!
//! - `!include path` - replace the node with another YAML file, resolved
//!   against the directory of the file holding the tag
//! - `!secret key` - substitute from `secrets.yaml`
//! - `!env_var VAR [default]` - substitute an environment variable, falling
//!   back to the optional default

use serde_yaml::value::TaggedValue;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;

/// Tags the loader understands; anything else is kept as is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Include,
    Secret,
    EnvVar,
}

impl Tag {
    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "!include" => Some(Tag::Include),
            "!secret" => Some(Tag::Secret),
            "!env_var" => Some(Tag::EnvVar),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Tag::Include => "!include",
            Tag::Secret => "!secret",
            Tag::EnvVar => "!env_var",
        }
    }
}

/// Reads YAML files below a config directory and expands custom tags
pub struct YamlLoader {
    root: PathBuf,
    secrets: Secrets,
    /// Files being read, outermost first
    open: Vec<PathBuf>,
}

impl YamlLoader {
    /// Loader for `root`, reading `root/secrets.yaml` if present
    pub fn open(root: impl Into<PathBuf>) -> ConfigResult<Self> {
        let root = root.into();
        let secrets = Secrets::load(&root)?;
        Ok(Self::with_secrets(root, secrets))
    }

    pub fn with_secrets(root: impl Into<PathBuf>, secrets: Secrets) -> Self {
        Self {
            root: root.into(),
            secrets,
            open: Vec::new(),
        }
    }

    /// Read a file; relative paths are taken from the config directory
    pub fn read(&mut self, file: impl AsRef<Path>) -> ConfigResult<Value> {
        let file = file.as_ref();
        let path = if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.root.join(file)
        };

        if self.open.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }
        debug!("Reading {:?}", path);

        let text = fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
            path: path.clone(),
            source,
        })?;

        self.open.push(path.clone());
        let value = self.parse(&text, &path);
        self.open.pop();
        value
    }

    /// Parse YAML text; `origin` anchors relative includes
    pub fn parse(&mut self, text: &str, origin: &Path) -> ConfigResult<Value> {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        let node = serde_yaml::from_str(text).map_err(|source| ConfigError::ParseYaml {
            path: origin.to_path_buf(),
            source,
        })?;
        self.expand(node, origin)
    }

    fn expand(&mut self, node: Value, origin: &Path) -> ConfigResult<Value> {
        Ok(match node {
            Value::Tagged(tagged) => self.expand_tag(*tagged, origin)?,
            Value::Mapping(mapping) => {
                let mut expanded = serde_yaml::Mapping::with_capacity(mapping.len());
                for (key, value) in mapping {
                    expanded.insert(key, self.expand(value, origin)?);
                }
                Value::Mapping(expanded)
            }
            Value::Sequence(items) => Value::Sequence(
                items
                    .into_iter()
                    .map(|item| self.expand(item, origin))
                    .collect::<ConfigResult<_>>()?,
            ),
            scalar => scalar,
        })
    }

    fn expand_tag(&mut self, tagged: TaggedValue, origin: &Path) -> ConfigResult<Value> {
        let Some(tag) = Tag::parse(&tagged.tag.to_string()) else {
            trace!("Keeping unknown tag {}", tagged.tag);
            let value = self.expand(tagged.value, origin)?;
            return Ok(Value::Tagged(Box::new(TaggedValue {
                tag: tagged.tag,
                value,
            })));
        };

        let argument = match tagged.value {
            Value::String(argument) => argument,
            other => {
                return Err(match tag {
                    Tag::Include => ConfigError::InvalidIncludePath {
                        path: format!("{:?}", other),
                        reason: "expected a file name".to_string(),
                    },
                    _ => ConfigError::InvalidValue {
                        key: tag.name().to_string(),
                        reason: "expected a string argument".to_string(),
                    },
                })
            }
        };

        match tag {
            Tag::Include => {
                let target = match origin.parent() {
                    Some(dir) => dir.join(&argument),
                    None => self.root.join(&argument),
                };
                self.read(target)
            }
            Tag::Secret => {
                let secret = self.secrets.get(&argument)?;
                trace!("Resolved secret {}", argument);
                Ok(Value::String(secret.to_string()))
            }
            Tag::EnvVar => env_var(&argument),
        }
    }
}

/// `VAR` or `VAR default text`; defaults are parsed as YAML so
/// `!env_var PORT 8123` yields a number
fn env_var(argument: &str) -> ConfigResult<Value> {
    let argument = argument.trim();
    let (name, default) = match argument.split_once(char::is_whitespace) {
        Some((name, default)) => (name, Some(default.trim())),
        None => (argument, None),
    };

    if let Ok(value) = std::env::var(name) {
        return Ok(Value::String(value));
    }
    let default = default.ok_or_else(|| ConfigError::EnvVarNotFound {
        var: name.to_string(),
    })?;
    debug!("{} is not set, using its default", name);
    Ok(serde_yaml::from_str(default).unwrap_or_else(|_| Value::String(default.to_string())))
}

/// Read `file` below `config_dir` with tag expansion
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::open(config_dir)?.read(file)
}
