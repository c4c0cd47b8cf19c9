//! Secret-service storage through the libsecret `secret-tool` helper.
//!
//! The helper talks to whichever secret-service daemon owns the session bus
//! (GNOME Keyring, KWallet, KeePassXC). The token JSON is passed on stdin,
//! never on the command line.

use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;

use tracing::{debug, instrument};
use zeroize::Zeroizing;

use super::{ACCOUNT_NAME, SERVICE_NAME, StorageBackend, TokenBackend, parse_token};
use crate::error::{Result, TokenError};
use crate::token::Token;

/// Default helper binary.
pub const DEFAULT_HELPER: &str = "secret-tool";

/// Result of running a helper command.
#[derive(Debug, Clone, Default)]
pub struct HelperOutput {
    /// Exit code, `None` when killed by a signal.
    pub status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl HelperOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// `secret-tool` exits 1 with nothing on stderr when no item matches.
    pub fn is_no_match(&self) -> bool {
        self.status == Some(1) && self.stderr_text().is_empty()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Runs helper processes. Swapped for a scripted fake in tests.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str], stdin: Option<&[u8]>) -> std::io::Result<HelperOutput>;
}

/// Runs helpers with [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], stdin: Option<&[u8]>) -> std::io::Result<HelperOutput> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // The pipe is closed before waiting, and the child is always reaped,
        // even when the helper exits without reading its input.
        let written = match (stdin, child.stdin.take()) {
            (Some(input), Some(mut pipe)) => pipe.write_all(input),
            _ => Ok(()),
        };

        let output = child.wait_with_output()?;
        written?;
        Ok(HelperOutput {
            status: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Secret-service storage via a helper binary.
#[derive(Clone)]
pub struct SecretHelperBackend {
    program: String,
    service: String,
    account: String,
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for SecretHelperBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretHelperBackend")
            .field("program", &self.program)
            .field("service", &self.service)
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl Default for SecretHelperBackend {
    fn default() -> Self {
        Self::new(DEFAULT_HELPER, SERVICE_NAME, Arc::new(SystemRunner))
    }
}

impl SecretHelperBackend {
    pub fn new(
        program: impl Into<String>,
        service: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            program: program.into(),
            service: service.into(),
            account: ACCOUNT_NAME.to_string(),
            runner,
        }
    }

    fn attributes(&self) -> [&str; 4] {
        ["service", self.service.as_str(), "account", self.account.as_str()]
    }

    fn run(&self, verb: &str, extra: &[&str], stdin: Option<&[u8]>) -> Result<HelperOutput> {
        let mut args: Vec<&str> = Vec::with_capacity(1 + extra.len() + 4);
        args.push(verb);
        args.extend_from_slice(extra);
        args.extend_from_slice(&self.attributes());

        self.runner
            .run(&self.program, &args, stdin)
            .map_err(|e| self.unavailable(format!("failed to run '{}': {e}", self.program)))
    }

    fn unavailable(&self, message: impl Into<String>) -> TokenError {
        TokenError::unavailable(StorageBackend::SecretHelper.to_string(), message)
    }

    fn failure(&self, verb: &str, output: &HelperOutput) -> TokenError {
        let detail = output.stderr_text();
        let status = output
            .status
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        if detail.is_empty() {
            self.unavailable(format!("'{} {verb}' exited with {status}", self.program))
        } else {
            self.unavailable(format!("'{} {verb}' exited with {status}: {detail}", self.program))
        }
    }
}

impl TokenBackend for SecretHelperBackend {
    #[instrument(skip(self), fields(program = %self.program))]
    fn load(&self) -> Result<Option<Token>> {
        let output = self.run("lookup", &[], None)?;
        if output.is_no_match() {
            return Ok(None);
        }
        if !output.success() {
            return Err(self.failure("lookup", &output));
        }

        let raw = Zeroizing::new(
            String::from_utf8(output.stdout)
                .map_err(|_| TokenError::corrupt(self.location(), "stored secret is not valid UTF-8"))?,
        );
        parse_token(&raw, &self.location()).map(Some)
    }

    #[instrument(skip(self, token), fields(program = %self.program))]
    fn save(&self, token: &Token) -> Result<()> {
        let json = Zeroizing::new(
            serde_json::to_string(token)
                .map_err(|e| self.unavailable(format!("failed to serialize token: {e}")))?,
        );
        let label = format!("{} OAuth token", self.service);
        let output = self.run("store", &["--label", label.as_str()], Some(json.as_bytes()))?;
        if !output.success() {
            return Err(self.failure("store", &output));
        }
        debug!("token saved via secret helper");
        Ok(())
    }

    #[instrument(skip(self), fields(program = %self.program))]
    fn remove(&self) -> Result<()> {
        let output = self.run("clear", &[], None)?;
        if output.success() || output.is_no_match() {
            Ok(())
        } else {
            Err(self.failure("clear", &output))
        }
    }

    fn kind(&self) -> StorageBackend {
        StorageBackend::SecretHelper
    }

    fn location(&self) -> String {
        format!(
            "{} service={} account={}",
            self.program, self.service, self.account
        )
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted stand-in for `secret-tool` backed by a single in-memory slot.

    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub struct FakeSecretTool {
        pub slot: Mutex<Option<Vec<u8>>>,
        pub calls: Mutex<Vec<Vec<String>>>,
        /// When set, every call fails with this stderr.
        pub broken: Mutex<Option<String>>,
    }

    impl CommandRunner for FakeSecretTool {
        fn run(&self, _program: &str, args: &[&str], stdin: Option<&[u8]>) -> std::io::Result<HelperOutput> {
            self.calls
                .lock()
                .push(args.iter().map(|a| a.to_string()).collect());

            if let Some(msg) = self.broken.lock().clone() {
                return Ok(HelperOutput {
                    status: Some(1),
                    stdout: Vec::new(),
                    stderr: msg.into_bytes(),
                });
            }

            let mut slot = self.slot.lock();
            let ok = HelperOutput {
                status: Some(0),
                ..Default::default()
            };
            let no_match = HelperOutput {
                status: Some(1),
                ..Default::default()
            };
            Ok(match args.first().copied() {
                Some("lookup") => match slot.as_ref() {
                    Some(bytes) => HelperOutput {
                        stdout: bytes.clone(),
                        ..ok
                    },
                    None => no_match,
                },
                Some("store") => {
                    *slot = stdin.map(<[u8]>::to_vec);
                    ok
                }
                Some("clear") => {
                    *slot = None;
                    ok
                }
                _ => HelperOutput {
                    status: Some(2),
                    stdout: Vec::new(),
                    stderr: b"usage".to_vec(),
                },
            })
        }
    }
}
