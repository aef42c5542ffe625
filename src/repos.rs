//! Git plumbing for package repositories
//!
//! The manifest layer pins each package to a git tag; this module does the
//! fetch/checkout/tag legwork. One git invocation per call, sequential, in
//! the style of the control-plane client.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Branch a package falls back to when its pin is empty or `head`.
pub const DEFAULT_MAIN: &str = "main";

async fn git(dir: Option<&Path>, args: &[&str]) -> Result<std::process::Output> {
    let mut command = Command::new("git");
    if let Some(dir) = dir {
        command.current_dir(dir);
    }
    command.args(args);
    debug!(args = ?args, dir = ?dir, "Running git");
    command
        .output()
        .await
        .with_context(|| format!("Failed to run git {}", args.join(" ")))
}

/// Run git and fail on non-zero exit.
async fn git_ok(dir: Option<&Path>, args: &[&str]) -> Result<()> {
    let output = git(dir, args).await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        anyhow::bail!("git {} failed: {stderr}", args.join(" "));
    }
    Ok(())
}

/// Bring `repodir/<name>` to `versiontag`, cloning from `repo_url` when the
/// checkout does not exist yet.
///
/// An empty or `head` pin resolves to `default_main`. Pull-rebase failures
/// (e.g. a detached HEAD after checking out a tag) are absorbed with a
/// warning; they are local and recoverable.
pub async fn checkout_repo(
    name: &str,
    repo_url: &str,
    versiontag: &str,
    repodir: &Path,
    default_main: &str,
) -> Result<()> {
    let repopath = repodir.join(name);

    if repopath.is_dir() {
        info!(
            repo = %repo_url,
            tag = %versiontag,
            path = %repopath.display(),
            "Checking out"
        );
        git_ok(Some(&repopath), &["fetch"]).await?;
        if !versiontag.is_empty() {
            git_ok(Some(&repopath), &["checkout", versiontag]).await?;
        }
        if let Err(error) = git_ok(Some(&repopath), &["pull", "--rebase"]).await {
            warn!(repo = %name, error = %error, "Rebase failed");
        }
    } else {
        info!(
            repo = %repo_url,
            tag = %versiontag,
            path = %repopath.display(),
            "Cloning"
        );
        git_ok(
            None,
            &["clone", repo_url, &repopath.display().to_string()],
        )
        .await?;
    }

    let target = if versiontag.is_empty() || versiontag.eq_ignore_ascii_case("head") {
        default_main
    } else {
        versiontag
    };
    git_ok(Some(&repopath), &["checkout", target]).await
}

/// True when the checkout at `repopath` differs from `since_tag`.
///
/// A failing diff (unknown tag, shallow history) counts as changed: the safe
/// answer when history cannot be compared is to mint a fresh tag.
pub async fn changed_since(repopath: &Path, since_tag: &str) -> Result<bool> {
    let output = git(Some(repopath), &["diff", since_tag]).await?;
    if !output.status.success() {
        return Ok(true);
    }
    Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
}

/// Create annotated tag `tag` at HEAD of `repopath` and push all tags to
/// origin.
pub async fn tag_and_push(repopath: &Path, tag: &str) -> Result<()> {
    info!(path = %repopath.display(), tag, "Creating tag");
    git_ok(Some(repopath), &["tag", "-a", tag, "-m", tag]).await?;
    git_ok(Some(repopath), &["push", "origin", "--tags"]).await
}
