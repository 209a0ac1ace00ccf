//! OpenSSH grant source
//!
//! Reads a host's `authorized_keys` layout over one multiplexed OpenSSH
//! connection. Commands run one at a time; the roster diff engine decides
//! their order.

use accessaudit::{
    AuditError, Grant, GrantListing, GrantSource, HostConnector, Location, Subject,
    DEFAULT_HOME_ROOT,
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, warn};

/// Exit status OpenSSH reports for its own failures
const SSH_FAILURE_STATUS: i32 = 255;

const MISSING_FILE: &str = "No such file or directory";

/// Captured result of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Stderr lines that report errors; OpenSSH `Warning:` lines are dropped
    fn errors(&self) -> Vec<&str> {
        self.stderr
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with("Warning:"))
            .collect()
    }
}

/// Remote command execution on one host
#[async_trait]
pub trait SshSession: Send + Sync {
    fn host(&self) -> &str;

    /// Run `command` through the remote shell
    async fn run(&self, command: &str) -> accessaudit::Result<CommandOutput>;

    /// Tear the session down
    async fn close(&self) {}
}

/// Quote `value` for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Command listing the identities under `home_root`
pub fn list_homes_command(home_root: &str) -> String {
    format!("ls -1 {}", shell_quote(home_root))
}

/// Command printing the comment field of every key in `location`'s keys file
pub fn list_keys_command(location: &Location) -> String {
    format!(
        r#"grep -E "([a-z]{{1,30}}|\.){{1,7}}" {} | cut -d" " -f3"#,
        shell_quote(&location.authorized_keys())
    )
}

/// Grant source reading `authorized_keys` files through an [`SshSession`]
pub struct SshGrantSource<S> {
    session: S,
    home_root: String,
}

impl<S: SshSession> SshGrantSource<S> {
    pub fn new(session: S, home_root: impl Into<String>) -> Self {
        Self {
            session,
            home_root: home_root.into(),
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }
}

#[async_trait]
impl<S: SshSession> GrantSource for SshGrantSource<S> {
    fn host(&self) -> &str {
        self.session.host()
    }

    async fn list_home_identities(&self) -> accessaudit::Result<Vec<Subject>> {
        let output = self.session.run(&list_homes_command(&self.home_root)).await?;

        if output.status != Some(0) {
            return Err(AuditError::transport(format!(
                "ls {}: {}",
                self.home_root,
                output.stderr.trim()
            )));
        }

        Ok(output
            .stdout
            .split_whitespace()
            .map(Subject::new)
            .filter(|subject| !subject.is_empty())
            .collect())
    }

    async fn list_grants(&self, location: &Location) -> accessaudit::Result<GrantListing> {
        let output = self.session.run(&list_keys_command(location)).await?;

        if output.status == Some(SSH_FAILURE_STATUS) || output.status.is_none() {
            return Err(AuditError::transport(format!(
                "ssh exited with {:?}: {}",
                output.status,
                output.stderr.trim()
            )));
        }

        let errors = output.errors();
        if !errors.is_empty() {
            let keys_file = location.authorized_keys();
            let missing = errors
                .iter()
                .all(|line| line.contains(&keys_file) && line.contains(MISSING_FILE));
            if missing {
                return Ok(GrantListing::NotFound);
            }
            return Err(AuditError::transport(errors.join("; ")));
        }

        Ok(GrantListing::Found(
            output
                .stdout
                .split_whitespace()
                .map(|holder| Subject::new(Subject::new(holder).local_part()))
                .filter(|subject| !subject.is_empty())
                .map(|subject| Grant::new(subject, location.clone()))
                .collect(),
        ))
    }

    async fn close(&self) {
        self.session.close().await;
    }
}

/// OpenSSH client settings shared by every host
#[derive(Debug, Clone)]
pub struct SshSettings {
    pub user: String,
    pub port: u16,
    pub identity_file: Option<PathBuf>,
    pub connect_timeout: Duration,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            port: 22,
            identity_file: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// One multiplexed OpenSSH connection
pub struct OpenSshSession {
    host: String,
    settings: SshSettings,
    control_dir: TempDir,
}

impl OpenSshSession {
    pub fn new(host: impl Into<String>, settings: SshSettings) -> accessaudit::Result<Self> {
        let control_dir = tempfile::Builder::new()
            .prefix("accessaudit-ssh-")
            .tempdir()
            .map_err(|e| AuditError::Internal(format!("control directory: {}", e)))?;

        Ok(Self {
            host: host.into(),
            settings,
            control_dir,
        })
    }

    fn command(&self) -> Command {
        let mut command = Command::new("ssh");
        command
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.settings.connect_timeout.as_secs().max(1)
            ))
            .arg("-o")
            .arg("ControlMaster=auto")
            .arg("-o")
            .arg(format!("ControlPath={}/%C", self.control_dir.path().display()))
            .arg("-o")
            .arg("ControlPersist=60")
            .arg("-o")
            .arg("ServerAliveInterval=15")
            .arg("-o")
            .arg("ServerAliveCountMax=3")
            .arg("-p")
            .arg(self.settings.port.to_string())
            .arg("-l")
            .arg(&self.settings.user);

        if let Some(identity) = &self.settings.identity_file {
            command.arg("-i").arg(identity);
        }

        command.kill_on_drop(true);
        command
    }
}

#[async_trait]
impl SshSession for OpenSshSession {
    fn host(&self) -> &str {
        &self.host
    }

    async fn run(&self, remote: &str) -> accessaudit::Result<CommandOutput> {
        debug!("{}: {}", self.host, remote);

        let output = self
            .command()
            .arg(&self.host)
            .arg("--")
            .arg(remote)
            .output()
            .await
            .map_err(|e| AuditError::Internal(format!("failed to spawn ssh: {}", e)))?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn close(&self) {
        let result = self
            .command()
            .arg("-O")
            .arg("exit")
            .arg(&self.host)
            .output()
            .await;

        if let Err(e) = result {
            warn!("{}: failed to close control connection: {}", self.host, e);
        }
    }
}

/// Connects to hosts with the system OpenSSH client
pub struct OpenSshConnector {
    settings: SshSettings,
    home_root: String,
}

impl OpenSshConnector {
    pub fn new(settings: SshSettings) -> Self {
        Self {
            settings,
            home_root: DEFAULT_HOME_ROOT.to_string(),
        }
    }

    pub fn with_home_root(mut self, home_root: impl Into<String>) -> Self {
        self.home_root = home_root.into();
        self
    }
}

#[async_trait]
impl HostConnector for OpenSshConnector {
    async fn connect(&self, host: &str) -> accessaudit::Result<Box<dyn GrantSource>> {
        let session = OpenSshSession::new(host, self.settings.clone())?;

        let check = session.run("true").await?;
        if check.status != Some(0) {
            let reason = match check.stderr.trim() {
                "" => format!("ssh exited with {:?}", check.status),
                stderr => stderr.to_string(),
            };
            return Err(AuditError::host_unreachable(host, reason));
        }

        Ok(Box::new(SshGrantSource::new(session, self.home_root.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct ScriptedSession {
        responses: HashMap<String, CommandOutput>,
        log: Mutex<Vec<String>>,
    }

    impl ScriptedSession {
        fn new(responses: Vec<(String, CommandOutput)>) -> Self {
            Self {
                responses: responses.into_iter().collect(),
                log: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SshSession for ScriptedSession {
        fn host(&self) -> &str {
            "bastion"
        }

        async fn run(&self, command: &str) -> accessaudit::Result<CommandOutput> {
            self.log.lock().unwrap().push(command.to_string());
            Ok(self
                .responses
                .get(command)
                .cloned()
                .unwrap_or_else(|| CommandOutput::failure(127, "unexpected command")))
        }
    }

    fn keys(path: &str) -> String {
        list_keys_command(&Location::new(path))
    }

    #[test]
    fn test_commands() {
        assert_eq!(list_homes_command("/home"), "ls -1 '/home'");
        assert_eq!(
            keys("/var/lib/backup"),
            r#"grep -E "([a-z]{1,30}|\.){1,7}" '/var/lib/backup/.ssh/authorized_keys' | cut -d" " -f3"#
        );
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[tokio::test]
    async fn test_listing_homes_and_keys() {
        let source = SshGrantSource::new(
            ScriptedSession::new(vec![
                (list_homes_command("/home"), CommandOutput::success("alice\nbob\ndeploy\n")),
                (
                    keys("/home/deploy"),
                    CommandOutput::success("alice@example.com\nmallory@laptop.example.com\n"),
                ),
                (
                    keys("/home/bob"),
                    CommandOutput {
                        status: Some(0),
                        stdout: String::new(),
                        stderr: "grep: /home/bob/.ssh/authorized_keys: No such file or directory\n"
                            .to_string(),
                    },
                ),
                (
                    keys("/home/alice"),
                    CommandOutput {
                        status: Some(0),
                        stdout: String::new(),
                        stderr: "grep: /home/alice/.ssh/authorized_keys: Permission denied\n"
                            .to_string(),
                    },
                ),
            ]),
            "/home",
        );

        let homes = source.list_home_identities().await.unwrap();
        assert_eq!(homes.len(), 3);

        match source.list_grants(&Location::new("/home/deploy")).await.unwrap() {
            GrantListing::Found(grants) => {
                let holders: Vec<&str> = grants.iter().map(|g| g.subject.identity()).collect();
                assert_eq!(holders, vec!["alice", "mallory"]);
            }
            GrantListing::NotFound => panic!("Expected grants"),
        }

        assert_eq!(
            source.list_grants(&Location::new("/home/bob")).await.unwrap(),
            GrantListing::NotFound
        );

        match source.list_grants(&Location::new("/home/alice")).await {
            Err(AuditError::Transport(msg)) => assert!(msg.contains("Permission denied")),
            other => panic!("Expected transport error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_key_listing_failures() {
        let source = SshGrantSource::new(
            ScriptedSession::new(vec![
                (
                    keys("/home/deploy"),
                    CommandOutput {
                        status: Some(0),
                        stdout: "mallory@laptop.example.com\n".to_string(),
                        stderr: "Warning: Permanently added 'bastion' (ED25519) to the list of known hosts.\n"
                            .to_string(),
                    },
                ),
                (
                    keys("/home/carol"),
                    CommandOutput::failure(
                        SSH_FAILURE_STATUS,
                        "Warning: Identity file /keys/audit not accessible: No such file or directory.\n\
                         ssh: connect to host bastion port 22: Connection timed out\n",
                    ),
                ),
                (
                    keys("/home/erin"),
                    CommandOutput {
                        status: Some(0),
                        stdout: String::new(),
                        stderr: "bash: /home/erin/.bashrc: No such file or directory\n".to_string(),
                    },
                ),
                (
                    keys("/home/frank"),
                    CommandOutput {
                        status: None,
                        stdout: String::new(),
                        stderr: String::new(),
                    },
                ),
            ]),
            "/home",
        );

        match source.list_grants(&Location::new("/home/deploy")).await.unwrap() {
            GrantListing::Found(grants) => {
                let holders: Vec<&str> = grants.iter().map(|g| g.subject.identity()).collect();
                assert_eq!(holders, vec!["mallory"]);
            }
            GrantListing::NotFound => panic!("Expected grants"),
        }

        for home in ["/home/carol", "/home/erin", "/home/frank"] {
            assert!(
                matches!(
                    source.list_grants(&Location::new(home)).await,
                    Err(AuditError::Transport(_))
                ),
                "{} should be a transport failure",
                home
            );
        }
    }

    #[test]
    fn test_keepalive_options() {
        let session = OpenSshSession::new("bastion", SshSettings::default()).unwrap();
        let command = session.command();
        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();

        assert!(args.contains(&"ServerAliveInterval=15".to_string()));
        assert!(args.contains(&"ServerAliveCountMax=3".to_string()));
        assert!(args.contains(&"ConnectTimeout=10".to_string()));
    }

    #[tokio::test]
    async fn test_failed_home_listing() {
        let source = SshGrantSource::new(
            ScriptedSession::new(vec![(
                list_homes_command("/export/home"),
                CommandOutput::failure(2, "ls: cannot access '/export/home': No such file or directory"),
            )]),
            "/export/home",
        );

        assert!(matches!(
            source.list_home_identities().await,
            Err(AuditError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_drives_roster_diff() {
        use accessaudit::{Role, RosterDiffEngine, SourceOfTruth};

        let source = SshGrantSource::new(
            ScriptedSession::new(vec![
                (list_homes_command("/home"), CommandOutput::success("a\nb\nc\nr1\n")),
                (keys("/home/a"), CommandOutput::success("a@example.com\n")),
                (keys("/home/b"), CommandOutput::success("b@example.com\n")),
                (
                    keys("/home/r1"),
                    CommandOutput::success("a@example.com\nd@example.com\n"),
                ),
            ]),
            "/home",
        );

        let truth = SourceOfTruth::new()
            .with_user("a")
            .with_user("b")
            .with_role(Role::new("r1", ["a"]));

        let diff = RosterDiffEngine::new().diff(&truth, &source).await.unwrap();

        assert!(diff.source_only.is_empty());
        assert_eq!(diff.host_only.len(), 1);
        assert!(diff.host_only.contains(&Subject::new("c")));
        assert_eq!(diff.excess_members["r1"], vec![Subject::new("d")]);

        let log = source.session().log.lock().unwrap().clone();
        assert_eq!(log[0], list_homes_command("/home"));
        assert_eq!(log.len(), 4);
    }
}
