//! Salt master configuration.
//!
//! Reads the master config file and, like Salt's own loader, the
//! `master.d/*.conf` drop-ins next to it, merged recursively. A master that
//! sets no `id` gets Salt's default of `<hostname>_master`. Only the settings
//! the authorization check needs are extracted.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::ConfigError;
use crate::minion::AuthorityId;

pub const DEFAULT_MASTER_CONFIG: &str = "/etc/salt/master";

/// Settings extracted from the master configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterConfig {
    /// File the settings were loaded from.
    pub path: PathBuf,
    /// Master `id`, untruncated; `<hostname>_master` when not configured.
    pub id: String,
    /// `rest_cherrypy` section, when salt-api is configured on this master.
    pub rest: Option<RestSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestSettings {
    pub port: u16,
    pub disable_ssl: bool,
}

#[derive(Deserialize)]
struct RawMaster {
    id: Option<Value>,
    rest_cherrypy: Option<RawRest>,
}

#[derive(Deserialize)]
struct RawRest {
    port: Option<u16>,
    #[serde(default)]
    disable_ssl: bool,
}

impl MasterConfig {
    /// Load `path` plus any `master.d/*.conf` in the same directory.
    ///
    /// Drop-ins are applied in filename order. Nested mappings are merged
    /// key by key; any other value set by a later file replaces the earlier one.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let host = gethostname::gethostname();
        Self::load_with_host(path, &host.to_string_lossy())
    }

    /// [`load`](Self::load) with an explicit hostname for the default `id`.
    pub fn load_with_host(path: &Path, host: &str) -> Result<Self, ConfigError> {
        let mut merged = read_mapping(path)?;

        for conf in drop_in_files(path)? {
            debug!(file = %conf.display(), "merging master.d drop-in");
            merge_into(&mut merged, read_mapping(&conf)?);
        }

        let raw: RawMaster =
            serde_yaml::from_value(Value::Mapping(merged)).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;

        let id = match raw.id {
            Some(Value::String(id)) => id,
            Some(other) => return Err(ConfigError::InvalidId(format!("{other:?}"))),
            None if !host.is_empty() => {
                debug!(host = %host, "no master id configured, using hostname default");
                format!("{host}_master")
            }
            None => return Err(ConfigError::MissingId(path.to_path_buf())),
        };

        let rest = raw.rest_cherrypy.and_then(|r| {
            r.port.map(|port| RestSettings {
                port,
                disable_ssl: r.disable_ssl,
            })
        });

        Ok(Self {
            path: path.to_path_buf(),
            id,
            rest,
        })
    }

    /// The master to target, derived from the configured id.
    pub fn authority(&self) -> Result<AuthorityId, ConfigError> {
        AuthorityId::from_master_id(&self.id)
    }

    /// salt-api URL implied by the local `rest_cherrypy` settings.
    pub fn api_url(&self) -> Option<String> {
        self.rest.as_ref().map(|rest| {
            let scheme = if rest.disable_ssl { "http" } else { "https" };
            format!("{scheme}://localhost:{}", rest.port)
        })
    }
}

/// Recursive dictionary update: mappings merge, everything else overwrites.
fn merge_into(base: &mut Mapping, overlay: Mapping) {
    for (key, value) in overlay {
        if let Value::Mapping(nested) = value {
            if let Some(Value::Mapping(existing)) = base.get_mut(&key) {
                merge_into(existing, nested);
                continue;
            }
            base.insert(key, Value::Mapping(nested));
        } else {
            base.insert(key, value);
        }
    }
}

fn read_mapping(path: &Path) -> Result<Mapping, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Mapping(map) => Ok(map),
        // An empty or all-comment file parses as null.
        Value::Null => Ok(Mapping::new()),
        _ => Err(ConfigError::NotAMapping(path.to_path_buf())),
    }
}

fn drop_in_files(path: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let dir = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("master.d");
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(&dir).map_err(|source| ConfigError::Io {
        path: dir.clone(),
        source,
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ConfigError::Io {
            path: dir.clone(),
            source,
        })?;
        let file = entry.path();
        if file.is_file() && file.extension().is_some_and(|ext| ext == "conf") {
            files.push(file);
        }
    }
    files.sort();
    Ok(files)
}
