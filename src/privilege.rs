//! Privilege helper for protected sensor paths
//!
//! Some GPU busy counters, thermal zones, RAPL energy counters and the
//! NVIDIA device nodes are root-only on many distributions. This module
//! widens read permission on a fixed allowlist of those paths through
//! `sudo` or `pkexec`, locally or on the host when running inside a
//! Flatpak sandbox.
//!
//! # Security
//! - The command run is a fixed script; no caller input reaches it
//! - The secret is written to `sudo -S` on stdin, never passed as an argument
//! - Without a secret, `sudo` runs non-interactively (`-n`)
//! - Every attempt is logged with the calling user and uid

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};
use std::process::{Command, Output, Stdio};

/// Paths made world-readable by [`prepare_access`]
pub const ACCESS_ALLOWLIST: &[&str] = &[
    "/sys/class/drm/card*/device/gpu_busy_percent",
    "/sys/class/drm/card*/device/usage",
    "/sys/class/hwmon/hwmon*/device/gpu_busy_percent",
    "/sys/class/thermal/thermal_zone*/temp",
    "/sys/class/thermal/thermal_zone*/type",
    "/sys/class/drm/card*/device/hwmon/hwmon*/temp*_input",
    "/sys/class/powercap/*/energy_uj",
    "/dev/nvidiactl",
    "/dev/nvidia[0-9]*",
];

/// Escalation tool available to this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeBackend {
    LocalSudo,
    LocalPkexec,
    HostSudo,
    HostPkexec,
    None,
}

impl PrivilegeBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivilegeBackend::LocalSudo => "local_sudo",
            PrivilegeBackend::LocalPkexec => "local_pkexec",
            PrivilegeBackend::HostSudo => "host_sudo",
            PrivilegeBackend::HostPkexec => "host_pkexec",
            PrivilegeBackend::None => "none",
        }
    }

    /// Runs through `flatpak-spawn --host`
    pub fn is_host(&self) -> bool {
        matches!(self, PrivilegeBackend::HostSudo | PrivilegeBackend::HostPkexec)
    }

    pub fn is_sudo(&self) -> bool {
        matches!(self, PrivilegeBackend::LocalSudo | PrivilegeBackend::HostSudo)
    }
}

impl fmt::Display for PrivilegeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a privileged operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessResult {
    pub ok: bool,
    /// Exit code of the escalated command
    pub code: i32,
    /// Combined command output, or the reason nothing ran
    pub error: String,
    pub backend: PrivilegeBackend,
}

impl AccessResult {
    fn failed(backend: PrivilegeBackend, reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            code: 1,
            error: reason.into(),
            backend,
        }
    }

    fn from_output(backend: PrivilegeBackend, output: &Output) -> Self {
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let code = output.status.code().unwrap_or(1);
        Self {
            ok: code == 0,
            code,
            error: text.trim().to_string(),
            backend,
        }
    }
}

fn command_exists(program: &str) -> bool {
    Command::new("which")
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn host_command_exists(program: &str) -> bool {
    Command::new("flatpak-spawn")
        .args(["--host", "which", program])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Probe `sudo`, `pkexec`, then both again on the Flatpak host
pub fn detect_backend() -> PrivilegeBackend {
    if command_exists("sudo") {
        return PrivilegeBackend::LocalSudo;
    }
    if command_exists("pkexec") {
        return PrivilegeBackend::LocalPkexec;
    }
    if command_exists("flatpak-spawn") {
        if host_command_exists("sudo") {
            return PrivilegeBackend::HostSudo;
        }
        if host_command_exists("pkexec") {
            return PrivilegeBackend::HostPkexec;
        }
    }
    PrivilegeBackend::None
}

/// Shell script applying `chmod a+r` to every existing allowlisted path
pub fn access_script() -> String {
    format!(
        "for f in {}; do [ -e \"$f\" ] && chmod a+r \"$f\" 2>/dev/null || true; done",
        ACCESS_ALLOWLIST.join(" ")
    )
}

/// Argument vector running `script` as root through `backend`.
///
/// Returns `None` for [`PrivilegeBackend::None`].
pub fn build_command(
    backend: PrivilegeBackend,
    with_secret: bool,
    script: &str,
) -> Option<Vec<String>> {
    let mut argv: Vec<String> = Vec::new();
    if backend.is_host() {
        argv.extend(["flatpak-spawn", "--host"].map(String::from));
    }
    match backend {
        PrivilegeBackend::None => return None,
        b if b.is_sudo() && with_secret => {
            argv.extend(["sudo", "-S", "-k", "-p", ""].map(String::from));
        }
        b if b.is_sudo() => argv.extend(["sudo", "-n"].map(String::from)),
        _ => argv.push("pkexec".to_string()),
    }
    argv.extend(["sh", "-lc", script].map(String::from));
    Some(argv)
}

fn spawn(argv: &[String], secret: Option<&str>) -> io::Result<Output> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if secret.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

    let mut child = cmd.spawn()?;
    if let (Some(secret), Some(mut stdin)) = (secret, child.stdin.take()) {
        stdin.write_all(secret.as_bytes())?;
        stdin.write_all(b"\n")?;
    }
    child.wait_with_output()
}

fn log_privileged_operation(operation: &str, result: &AccessResult) {
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".into());
    let uid = nix::unistd::getuid();

    if result.ok {
        log::info!(
            "Privileged operation '{}' via {} succeeded for user {} (UID: {})",
            operation,
            result.backend,
            user,
            uid
        );
    } else {
        log::warn!(
            "Privileged operation '{}' via {} failed for user {} (UID: {}): code {}",
            operation,
            result.backend,
            user,
            uid,
            result.code
        );
    }
}

fn run_privileged(operation: &str, secret: Option<&str>, script: &str) -> AccessResult {
    let secret = secret.filter(|s| !s.is_empty());
    let backend = detect_backend();

    let result = match build_command(backend, backend.is_sudo() && secret.is_some(), script) {
        None => AccessResult::failed(
            backend,
            "no privilege escalation tool (sudo/pkexec) found locally or on the host",
        ),
        Some(argv) => {
            let stdin_secret = if backend.is_sudo() { secret } else { None };
            match spawn(&argv, stdin_secret) {
                Ok(output) => AccessResult::from_output(backend, &output),
                Err(e) => {
                    AccessResult::failed(backend, format!("failed to run {}: {}", argv[0], e))
                }
            }
        }
    };

    log_privileged_operation(operation, &result);
    result
}

/// Check that the backend accepts `secret` by running `true`
pub fn verify(secret: Option<&str>) -> AccessResult {
    run_privileged("verify", secret, "true")
}

/// Widen read permission on [`ACCESS_ALLOWLIST`]
pub fn prepare_access(secret: Option<&str>) -> AccessResult {
    run_privileged("prepare_access", secret, &access_script())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(backend: PrivilegeBackend, with_secret: bool) -> Vec<String> {
        build_command(backend, with_secret, "true").unwrap()
    }

    #[test]
    fn test_sudo_with_secret_reads_stdin() {
        assert_eq!(
            argv(PrivilegeBackend::LocalSudo, true),
            vec!["sudo", "-S", "-k", "-p", "", "sh", "-lc", "true"]
        );
    }

    #[test]
    fn test_sudo_without_secret_is_non_interactive() {
        assert_eq!(
            argv(PrivilegeBackend::LocalSudo, false),
            vec!["sudo", "-n", "sh", "-lc", "true"]
        );
    }

    #[test]
    fn test_pkexec_ignores_secret() {
        assert_eq!(
            argv(PrivilegeBackend::LocalPkexec, true),
            vec!["pkexec", "sh", "-lc", "true"]
        );
    }

    #[test]
    fn test_host_backends_go_through_flatpak_spawn() {
        assert_eq!(
            argv(PrivilegeBackend::HostSudo, false),
            vec!["flatpak-spawn", "--host", "sudo", "-n", "sh", "-lc", "true"]
        );
        assert_eq!(
            argv(PrivilegeBackend::HostPkexec, false),
            vec!["flatpak-spawn", "--host", "pkexec", "sh", "-lc", "true"]
        );
    }

    #[test]
    fn test_no_backend_builds_nothing() {
        assert_eq!(build_command(PrivilegeBackend::None, true, "true"), None);
    }

    #[test]
    fn test_access_script_covers_allowlist() {
        let script = access_script();
        assert!(script.contains("chmod a+r"));
        for path in ACCESS_ALLOWLIST {
            assert!(script.contains(path));
        }
        assert!(script.contains("/sys/class/powercap/*/energy_uj"));
    }

    #[test]
    fn test_backend_labels() {
        assert_eq!(PrivilegeBackend::HostPkexec.to_string(), "host_pkexec");
        assert_eq!(
            serde_json::to_string(&PrivilegeBackend::LocalSudo).unwrap(),
            "\"local_sudo\""
        );
        let result = AccessResult::failed(PrivilegeBackend::None, "nothing");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["code"], 1);
        assert_eq!(json["backend"], "none");
    }
}
