//! Docker and git helpers for the production host.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use rand::Rng;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

use crate::env::{Environment, PROD_SRC_DIR};
use crate::error::{Error, Result};

/// Public bucket URL holding the container images.
pub const RESOURCE_URL: &str = "https://storage.googleapis.com/camlistore-website-resource/";
pub const GIT_IMAGE: (&str, &str) = ("camlistore/git", "docker-git.tar.gz");
pub const DEMO_IMAGE: (&str, &str) = ("camlistore/demoblobserver", "docker-demoblobserver.tar.gz");
pub const REPO_URL: &str = "https://camlistore.googlesource.com/camlistore";
pub const DEMO_CONTAINER: &str = "demoblob3179";

/// Host directory shared with the git container.
const SHARED_VOLUME: &str = "/var/camweb:/var/camweb";
const DEMO_RESTART_DELAY: Duration = Duration::from_secs(10);

/// Finds `program` the way a shell would: paths are taken as given,
/// bare names are searched for in `PATH`.
pub fn which(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let path = PathBuf::from(program);
        return is_executable(&path).then_some(path);
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata().is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Runs a command to completion, returning stdout. A non-zero exit is an
/// error carrying the combined output.
async fn run<I, S>(program: &str, args: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let out = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::process(program, e))?;
    if !out.status.success() {
        return Err(Error::process(
            program,
            format!(
                "{}: {}{}",
                out.status,
                String::from_utf8_lossy(&out.stdout),
                String::from_utf8_lossy(&out.stderr)
            ),
        ));
    }
    Ok(out.stdout)
}

/// Loads `image` from the resource bucket unless docker already has it.
pub async fn ensure_image(http: &reqwest::Client, (tag, file): (&str, &str)) -> Result<()> {
    if let Ok(have) = run("docker", ["inspect", tag]).await {
        if !have.is_empty() {
            return Ok(());
        }
    }
    info!(image = tag, "fetching docker image");
    let url = format!("{RESOURCE_URL}{file}");
    let res = http.get(&url).send().await?.error_for_status()?;
    let tarball = res.bytes().await?;

    let mut child = Command::new("docker")
        .arg("load")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .spawn()
        .map_err(|e| Error::process("docker", e))?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(&tarball).await?;
    }
    let status = child.wait().await?;
    if !status.success() {
        return Err(Error::process("docker", format!("load {tag}: {status}")));
    }
    Ok(())
}

/// How git commands run: inside the `camlistore/git` container, or with
/// the local binary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Git {
    pub container: bool,
}

impl Git {
    /// Program and arguments running `git <args>` in `workdir`.
    pub fn command_line(&self, workdir: Option<&Path>, args: &[&str]) -> (String, Vec<String>) {
        let mut argv: Vec<String> = Vec::new();
        if !self.container {
            if let Some(dir) = workdir {
                argv.extend(["-C".to_owned(), dir.display().to_string()]);
            }
            argv.extend(args.iter().map(|a| a.to_string()));
            return ("git".to_owned(), argv);
        }
        argv.extend(["run", "--rm", "-v", SHARED_VOLUME].map(String::from));
        if let Some(dir) = workdir {
            argv.extend(["-w".to_owned(), dir.display().to_string()]);
        }
        argv.extend([GIT_IMAGE.0, "git"].map(String::from));
        argv.extend(args.iter().map(|a| a.to_string()));
        ("docker".to_owned(), argv)
    }

    async fn run(&self, workdir: Option<&Path>, args: &[&str]) -> Result<Vec<u8>> {
        let (program, argv) = self.command_line(workdir, args);
        run(&program, &argv).await
    }

    /// Shallow clone of the Camlistore repository into `dest`.
    pub async fn clone_shallow(&self, dest: &Path) -> Result<()> {
        let dest = dest.display().to_string();
        self.run(None, &["clone", "--depth=1", REPO_URL, &dest]).await.map(drop)
    }

    /// `<date>-<short hash>` of the checked-out revision.
    pub async fn revision(&self, dir: &Path) -> Result<String> {
        let out = self
            .run(Some(dir), &["log", "-1", "--pretty=format:%ad-%h", "--abbrev-commit", "--date=short"])
            .await?;
        Ok(String::from_utf8_lossy(&out).trim().to_owned())
    }
}

/// `n` random lowercase hex digits.
pub fn rand_hex(n: usize) -> String {
    let mut buf = vec![0u8; n / 2 + 1];
    rand::rng().fill(buf.as_mut_slice());
    let mut hex: String = buf.iter().map(|b| format!("{b:02x}")).collect();
    hex.truncate(n);
    hex
}

fn demo_args(src_dir: &Path) -> Vec<String> {
    let example = format!("{PROD_SRC_DIR}/website/blobserver-example");
    vec![
        "run".into(),
        "--rm".into(),
        format!("--name={DEMO_CONTAINER}"),
        "-e".into(),
        format!("CAMLI_ROOT={example}/root"),
        "-e".into(),
        format!("CAMLI_PASSWORD={}", rand_hex(20)),
        "-v".into(),
        format!("{}:{PROD_SRC_DIR}", src_dir.display()),
        "--net=host".into(),
        format!("--workdir={PROD_SRC_DIR}"),
        DEMO_IMAGE.0.into(),
        "camlistored".into(),
        "--openbrowser=false".into(),
        "--listen=:3179".into(),
        format!("--configfile={example}/example-blobserver-config.json"),
    ]
}

/// Keeps the demo blob server container running.
///
/// Only on Linux hosts with docker. A stale container is killed first. In
/// production the container is restarted whenever it exits; elsewhere it
/// runs once. Failures are logged, never fatal.
pub async fn run_demo_blobserver_loop(env: Environment, src_dir: PathBuf) {
    if !cfg!(target_os = "linux") || which("docker").is_none() {
        return;
    }
    if run("docker", ["kill", DEMO_CONTAINER]).await.is_ok() {
        let _ = run("docker", ["rm", DEMO_CONTAINER]).await;
        info!(container = DEMO_CONTAINER, "killed and removed old container");
    }
    loop {
        if let Err(e) = run("docker", demo_args(&src_dir)).await {
            warn!(container = DEMO_CONTAINER, "demo blob server: {e}");
        }
        if !env.is_production() {
            return;
        }
        tokio::time::sleep(DEMO_RESTART_DELAY).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rand_hex_has_the_requested_length() {
        let a = rand_hex(20);
        assert_eq!(a.len(), 20);
        assert!(a.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
        assert_ne!(a, rand_hex(20));
        assert_eq!(rand_hex(3).len(), 3);
    }

    #[test]
    fn git_in_a_container_shares_the_volume() {
        let git = Git { container: true };
        let (program, args) = git.command_line(Some(Path::new(PROD_SRC_DIR)), &["log", "-1"]);
        assert_eq!(program, "docker");
        assert_eq!(
            args,
            [
                "run", "--rm", "-v", "/var/camweb:/var/camweb", "-w", PROD_SRC_DIR,
                "camlistore/git", "git", "log", "-1",
            ]
        );
    }

    #[test]
    fn local_git_runs_in_the_directory() {
        let git = Git { container: false };
        let (program, args) = git.command_line(Some(Path::new("/src")), &["status"]);
        assert_eq!(program, "git");
        assert_eq!(args, ["-C", "/src", "status"]);
    }

    #[test]
    fn demo_container_mounts_the_sources() {
        let args = demo_args(Path::new("/home/dev/camlistore"));
        assert!(args.contains(&"--name=demoblob3179".to_owned()));
        assert!(args.contains(&format!("/home/dev/camlistore:{PROD_SRC_DIR}")));
        assert!(args.iter().any(|a| a.starts_with("CAMLI_PASSWORD=") && a.len() == "CAMLI_PASSWORD=".len() + 20));
    }

    #[cfg(unix)]
    #[test]
    fn which_searches_path() {
        assert!(which("sh").is_some());
        assert!(which("definitely-not-a-real-program-camweb").is_none());
        assert_eq!(which("/bin/sh"), Some(PathBuf::from("/bin/sh")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_commands_report_their_output() {
        let err = run("sh", ["-c", "echo oops >&2; exit 3"]).await.err().unwrap();
        let text = err.to_string();
        assert!(text.contains("sh") && text.contains("oops"), "{text}");
    }
}
