//! Per-user profile store.
//!
//! One JSON document holds every named profile: the active tab selected with
//! `tabctl tabs select` and, optionally, the extension id the profile is
//! bound to. Reads are lenient so a missing or corrupt file behaves like an
//! empty one.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tabctl_protocol::TabId;
use tracing::warn;

use crate::error::{Result, TabctlError};

pub const CONFIG_DIR_ENV: &str = "TABCTL_CONFIG_DIR";
pub const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_PROFILE: &str = "default";

const SCHEMA: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileConfig {
	#[serde(default = "schema_version")]
	pub schema: u32,
	#[serde(default)]
	pub profiles: BTreeMap<String, Profile>,
}

impl Default for ProfileConfig {
	fn default() -> Self {
		Self {
			schema: SCHEMA,
			profiles: BTreeMap::new(),
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub active_tab_id: Option<TabId>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub extension_id: Option<String>,
}

fn schema_version() -> u32 {
	SCHEMA
}

/// The config file plus the profile name commands operate on.
#[derive(Debug)]
pub struct ProfileStore {
	path: PathBuf,
	name: String,
	config: ProfileConfig,
}

impl ProfileStore {
	/// `$TABCTL_CONFIG_DIR/config.json`, else `<config dir>/tabctl/config.json`.
	pub fn default_path() -> PathBuf {
		let dir = std::env::var_os(CONFIG_DIR_ENV)
			.map(PathBuf::from)
			.or_else(|| dirs::config_dir().map(|dir| dir.join("tabctl")))
			.unwrap_or_else(|| PathBuf::from(".tabctl"));
		dir.join(CONFIG_FILE)
	}

	pub fn open(name: impl Into<String>) -> Self {
		Self::open_at(Self::default_path(), name)
	}

	pub fn open_at(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
		let path = path.into();
		let config = load_json::<ProfileConfig>(&path).unwrap_or_default();
		Self {
			path,
			name: name.into(),
			config,
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// The selected profile, or an empty one when it was never saved.
	pub fn profile(&self) -> Profile {
		self.config.profiles.get(&self.name).cloned().unwrap_or_default()
	}

	pub fn active_tab(&self) -> Option<TabId> {
		self.config.profiles.get(&self.name).and_then(|p| p.active_tab_id)
	}

	pub fn extension_id(&self) -> Option<String> {
		self.config.profiles.get(&self.name).and_then(|p| p.extension_id.clone())
	}

	pub fn set_active_tab(&mut self, tab_id: Option<TabId>) -> Result<()> {
		self.entry().active_tab_id = tab_id;
		self.save()
	}

	pub fn set_extension_id(&mut self, extension_id: Option<String>) -> Result<()> {
		self.entry().extension_id = extension_id;
		self.save()
	}

	fn entry(&mut self) -> &mut Profile {
		self.config.profiles.entry(self.name.clone()).or_default()
	}

	fn save(&self) -> Result<()> {
		save_json(&self.path, &self.config)
	}
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
	let content = fs::read_to_string(path).ok()?;
	match serde_json::from_str(&content) {
		Ok(value) => Some(value),
		Err(err) => {
			warn!(target = "tabctl.cli", path = %path.display(), error = %err, "ignoring unreadable config");
			None
		}
	}
}

fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
	let wrap = |action, source| TabctlError::File {
		action,
		path: path.to_path_buf(),
		source,
	};
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).map_err(|err| wrap("create directory for", err))?;
	}
	fs::write(path, serde_json::to_string_pretty(data)?).map_err(|err| wrap("write", err))?;
	Ok(())
}
