//! Docker-backed suite execution.
//!
//! Everything here shells out to the `docker` CLI; there is no
//! orchestration beyond building one image and running one container. A
//! test file may embed its own Dockerfile behind a `-- Dockerfile --`
//! marker; otherwise a default one is generated from the configured base
//! image.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

/// Marker introducing an embedded Dockerfile section in a test file.
const DOCKERFILE_MARKER: &str = "-- Dockerfile --";

/// Image tag used for suite containers.
const IMAGE_TAG: &str = "scriptbox-runner";

/// What to run inside the container.
#[derive(Clone, Debug)]
pub struct SuiteConfig {
    /// Test scripts to ship into the build context.
    pub scripts: Vec<PathBuf>,
    /// Base image when no Dockerfile is embedded.
    pub image: String,
    /// Pass `UPDATE_SNAPSHOTS=1` through to the container.
    pub update_snapshots: bool,
    /// Pass `VERBOSE=1` through to the container.
    pub verbose: bool,
}

/// Build the image and run the suite container.
pub fn run_suite(config: &SuiteConfig) -> Result<()> {
    let context = tempfile::Builder::new()
        .prefix("scriptbox-docker-")
        .tempdir()
        .map_err(|err| Error::io("failed to create docker context", err))?;

    let testdata = context.path().join("testdata");
    fs::create_dir_all(&testdata)
        .map_err(|err| Error::io("failed to create docker testdata", err))?;
    let mut embedded = None;
    for script in &config.scripts {
        let name = script
            .file_name()
            .ok_or_else(|| {
                Error::io(
                    format!("script path {} has no file name", script.display()),
                    std::io::Error::from(std::io::ErrorKind::InvalidInput),
                )
            })?
            .to_os_string();
        fs::copy(script, testdata.join(name))
            .map_err(|err| Error::io("failed to stage script for docker", err))?;
        if embedded.is_none() {
            let text = fs::read_to_string(script)
                .map_err(|err| Error::io("failed to read script", err))?;
            embedded = extract_dockerfile(&text);
        }
    }

    let dockerfile = embedded.unwrap_or_else(|| default_dockerfile(&config.image));
    fs::write(context.path().join("Dockerfile"), dockerfile)
        .map_err(|err| Error::io("failed to write Dockerfile", err))?;

    build_image(context.path(), IMAGE_TAG)?;
    run_container(IMAGE_TAG, context.path(), config)
}

/// Pull the embedded Dockerfile out of a test file, if present. The
/// section runs from the marker to the next `-- name --` marker or the
/// end of the file.
pub fn extract_dockerfile(script_text: &str) -> Option<String> {
    let start = script_text.find(DOCKERFILE_MARKER)?;
    let body = script_text.get(start + DOCKERFILE_MARKER.len()..)?;
    let section = match body.find("\n-- ") {
        Some(end) => body.get(..end)?,
        None => body,
    };
    let section = section.trim();
    if section.is_empty() {
        None
    } else {
        Some(section.to_string())
    }
}

/// Dockerfile used when the test file does not embed one.
pub fn default_dockerfile(image: &str) -> String {
    format!(
        "FROM {image}\n\
         WORKDIR /work\n\
         COPY . .\n\
         CMD [\"cargo\", \"test\"]\n"
    )
}

/// `docker build -t TAG CONTEXT`.
pub fn build_image(context: &Path, tag: &str) -> Result<()> {
    tracing::debug!(tag, context = %context.display(), "building docker image");
    run_docker(&[
        "build".to_string(),
        "-t".to_string(),
        tag.to_string(),
        context.display().to_string(),
    ])
}

fn run_container(tag: &str, mount: &Path, config: &SuiteConfig) -> Result<()> {
    let mut args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "-v".to_string(),
        format!("{}:/work", mount.display()),
    ];
    if config.update_snapshots {
        args.push("-e".to_string());
        args.push("UPDATE_SNAPSHOTS=1".to_string());
    }
    if config.verbose {
        args.push("-e".to_string());
        args.push("VERBOSE=1".to_string());
    }
    args.push(tag.to_string());
    run_docker(&args)
}

fn run_docker(args: &[String]) -> Result<()> {
    let output = Command::new("docker")
        .args(args)
        .output()
        .map_err(|err| Error::tool("docker", err.to_string()))?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(Error::tool(
        "docker",
        format!(
            "docker {} exited with {}: {}",
            args.first().map(String::as_str).unwrap_or_default(),
            output.status,
            stderr.trim()
        ),
    ))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn extracts_embedded_dockerfile() {
        let script = "echo hi\nstdout 'hi'\n\n-- Dockerfile --\nFROM alpine:latest\nRUN apk add bash\n\n-- other.txt --\ndata\n";
        let dockerfile = extract_dockerfile(script).unwrap();
        assert_eq!(dockerfile, "FROM alpine:latest\nRUN apk add bash");
    }

    #[test]
    fn dockerfile_section_may_end_the_file() {
        let script = "echo hi\n\n-- Dockerfile --\nFROM debian:stable\n";
        assert_eq!(
            extract_dockerfile(script).unwrap(),
            "FROM debian:stable"
        );
    }

    #[test]
    fn missing_marker_yields_none() {
        assert!(extract_dockerfile("echo hi\nstdout 'hi'\n").is_none());
    }

    #[test]
    fn default_dockerfile_uses_base_image() {
        let dockerfile = default_dockerfile("rust:1.74");
        assert!(dockerfile.starts_with("FROM rust:1.74\n"));
        assert!(dockerfile.contains("WORKDIR /work"));
    }
}
