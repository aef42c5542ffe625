//! Deployment manifest: versioned package sets with clone/commit semantics
//!
//! A deployment names the packages (git repos pinned to tags) that make up a
//! deployable unit. Its version history is append-only: at most the trailing
//! version is uncommitted, and committing freezes fresh tags only for
//! packages whose repos actually changed — so a deployment version can take
//! an individual package "backward" by simply keeping the older tag.
//!
//! The manifest is a YAML document at a caller-chosen path; every mutating
//! operation saves it back immediately.

use crate::repos;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// One package of a deployment: a repo pinned to a version tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub repo_url: String,
    /// Empty while the owning version is uncommitted.
    #[serde(default)]
    pub versiontag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_yaml::Value>,
}

impl Package {
    pub fn new(
        name: impl Into<String>,
        repo_url: impl Into<String>,
        versiontag: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            repo_url: repo_url.into(),
            versiontag: versiontag.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Copy of this package with the tag cleared (for a new version).
    fn clone_reset(&self) -> Self {
        Self {
            versiontag: String::new(),
            ..self.clone()
        }
    }
}

/// One version of a deployment. Committed once `created_at` is stamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub versiontag: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<Package>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_yaml::Value>,
}

impl Version {
    pub fn new(versiontag: impl Into<String>) -> Self {
        let versiontag = versiontag.into();
        Self {
            name: versiontag.clone(),
            versiontag,
            packages: Vec::new(),
            created_at: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn is_committed(&self) -> bool {
        self.created_at.is_some()
    }

    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.iter().find(|package| package.name == name)
    }

    pub fn package_mut(&mut self, name: &str) -> Option<&mut Package> {
        self.packages.iter_mut().find(|package| package.name == name)
    }

    /// Add or replace a package by name.
    pub fn add_package(&mut self, package: Package) {
        match self.package_mut(&package.name) {
            Some(existing) => *existing = package,
            None => self.packages.push(package),
        }
    }

    /// Remove a package by name; absent names are ignored.
    pub fn remove_package(&mut self, name: &str) -> bool {
        let before = self.packages.len();
        self.packages.retain(|package| package.name != name);
        self.packages.len() != before
    }

    /// Clone into a fresh uncommitted version with package tags reset.
    fn clone_reset(&self, versiontag: &str) -> Self {
        Self {
            versiontag: versiontag.to_string(),
            name: versiontag.to_string(),
            packages: self.packages.iter().map(Package::clone_reset).collect(),
            created_at: None,
            metadata: self.metadata.clone(),
        }
    }
}

/// A named deployment and its append-only version history.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Deployment {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<Version>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_yaml::Value>,
}

impl Deployment {
    pub fn get_version(&self, versiontag: &str) -> Option<&Version> {
        self.versions
            .iter()
            .find(|version| version.versiontag == versiontag)
    }

    /// The trailing version, if it has not been committed yet.
    pub fn uncommitted_version(&self) -> Option<&Version> {
        self.versions.last().filter(|version| !version.is_committed())
    }

    pub fn uncommitted_version_mut(&mut self) -> Option<&mut Version> {
        self.versions
            .last_mut()
            .filter(|version| !version.is_committed())
    }

    /// Start a new version cloned from the last one (tags reset).
    ///
    /// Calling this again before the pending version is committed returns
    /// the existing uncommitted version, so repeated invocations collect
    /// into one. A tag that already exists in history is refused.
    pub fn new_version(&mut self, versiontag: &str) -> Result<&Version> {
        if self.get_version(versiontag).is_some() {
            bail!("Version {versiontag} already exists; use a different version tag");
        }

        if self.versions.last().is_some_and(|v| !v.is_committed()) {
            return Ok(self.versions.last().expect("just checked"));
        }

        let version = match self.versions.last() {
            Some(last) => last.clone_reset(versiontag),
            None => Version::new(versiontag),
        };
        self.versions.push(version);
        Ok(self.versions.last().expect("just pushed"))
    }
}

/// A deployment bound to its YAML file.
#[derive(Debug)]
pub struct Manifest {
    path: PathBuf,
    pub deployment: Deployment,
}

impl Manifest {
    /// Load the manifest at `path`. An empty file is an empty deployment.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let deployment = if contents.trim().is_empty() {
            Deployment::default()
        } else {
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse manifest {}", path.display()))?
        };
        Ok(Self { path, deployment })
    }

    /// Write the manifest back to its file.
    pub fn save(&self) -> Result<()> {
        let rendered =
            serde_yaml::to_string(&self.deployment).context("Failed to render manifest")?;
        std::fs::write(&self.path, rendered)
            .with_context(|| format!("Failed to write manifest {}", self.path.display()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_uncommitted(&mut self) -> Result<&mut Version> {
        self.deployment
            .uncommitted_version_mut()
            .context("No uncommitted version found. Run `versions new <tag>` first")
    }

    /// Start a new version; the default tag is derived from the current UTC
    /// hour (`vYYYYMMDD_HH`). Returns the tag of the now-pending version.
    pub fn new_version(&mut self, versiontag: Option<String>) -> Result<String> {
        let versiontag = versiontag.unwrap_or_else(default_versiontag);
        let pending = self.deployment.new_version(&versiontag)?.versiontag.clone();
        self.save()?;
        Ok(pending)
    }

    /// Add (or replace) a package in the pending version.
    pub fn add_package(&mut self, name: &str, repo_url: &str, versiontag: &str) -> Result<()> {
        self.ensure_uncommitted()?
            .add_package(Package::new(name, repo_url, versiontag));
        self.save()
    }

    /// Remove a package from the pending version; absent names are ignored.
    pub fn remove_package(&mut self, name: &str) -> Result<()> {
        self.ensure_uncommitted()?.remove_package(name);
        self.save()
    }

    /// Commit the pending version: check out every package, mint fresh tags
    /// for the packages whose repos changed since the previous version, push
    /// them, and stamp `created_at`.
    ///
    /// Refuses when nothing changed, which keeps the history meaningful and
    /// lets a version carry a package backward by retaining its older tag.
    pub async fn commit(&mut self, repodir: &Path) -> Result<()> {
        std::fs::create_dir_all(repodir)
            .with_context(|| format!("Failed to create {}", repodir.display()))?;
        let pending_tag = self.ensure_uncommitted()?.versiontag.clone();

        // Bring every checkout to the state this version describes.
        self.checkout(&pending_tag, repodir).await?;

        let previous = (self.deployment.versions.len() > 1)
            .then(|| self.deployment.versions[self.deployment.versions.len() - 2].clone());

        let now = Utc::now();
        let pending = self
            .deployment
            .uncommitted_version()
            .expect("checked above");
        let mut minted: Vec<(String, String)> = Vec::new();
        for package in &pending.packages {
            let changed = match previous.as_ref().and_then(|v| v.package(&package.name)) {
                Some(previous_package) => {
                    repos::changed_since(&repodir.join(&package.name), &previous_package.versiontag)
                        .await?
                }
                // First version, or a package new in this version.
                None => true,
            };
            if changed {
                let tag = format!(
                    "{}_{}_{}",
                    package.name,
                    now.timestamp(),
                    now.timestamp_subsec_micros()
                );
                minted.push((package.name.clone(), tag));
            }
        }

        if minted.is_empty() {
            bail!("No packages have changed; commit will not proceed");
        }

        for (name, tag) in &minted {
            info!(package = %name, tag = %tag, "Creating tag");
            repos::tag_and_push(&repodir.join(name), tag).await?;
        }

        let pending = self
            .deployment
            .uncommitted_version_mut()
            .expect("checked above");
        for (name, tag) in &minted {
            if let Some(package) = pending.package_mut(name) {
                package.versiontag = tag.clone();
            }
        }
        pending.created_at = Some(now);
        self.save()
    }

    /// Check out every package of `versiontag` into `repodir` at its pinned
    /// tag (`head` and unpinned packages resolve to the default branch).
    pub async fn checkout(&self, versiontag: &str, repodir: &Path) -> Result<()> {
        let version = self
            .deployment
            .get_version(versiontag)
            .with_context(|| format!("Version {versiontag} not found in manifest"))?;
        info!(version = %version.versiontag, "Checking out version");
        std::fs::create_dir_all(repodir)
            .with_context(|| format!("Failed to create {}", repodir.display()))?;
        for package in &version.packages {
            repos::checkout_repo(
                &package.name,
                &package.repo_url,
                &package.versiontag,
                repodir,
                repos::DEFAULT_MAIN,
            )
            .await?;
        }
        Ok(())
    }

    /// YAML rendering of one version, or of the whole deployment.
    pub fn describe(&self, versiontag: Option<&str>) -> Result<String> {
        match versiontag {
            Some(tag) => {
                let version = self
                    .deployment
                    .get_version(tag)
                    .with_context(|| format!("Version {tag} not found in manifest"))?;
                serde_yaml::to_string(version).context("Failed to render version")
            }
            None => serde_yaml::to_string(&self.deployment).context("Failed to render manifest"),
        }
    }
}

fn default_versiontag() -> String {
    Utc::now().format("v%Y%m%d_%H").to_string()
}
