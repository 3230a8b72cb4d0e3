//! Interactive prompts for `connect` and destructive commands.

use crate::config::{ConnectionConfig, DEFAULT_PORT, Transport};
use crate::error::{InputError, Result};

use anyhow::Context as _;
use dialoguer::{Confirm, Input, Password, Select};
use std::io::IsTerminal as _;
use std::path::PathBuf;

pub trait Prompt: Send + Sync {
    /// Ask for connection details field by field.
    fn connection(&self) -> Result<ConnectionConfig>;

    fn confirm(&self, question: &str) -> Result<bool>;
}

/// Prompts on the controlling terminal. Refuses to prompt when stdin is not
/// a terminal, so scripts fail instead of hanging.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    fn ensure_interactive(&self, what: &str) -> Result<()> {
        if std::io::stdin().is_terminal() {
            Ok(())
        } else {
            Err(InputError::Missing(format!(
                "{what} required but stdin is not a terminal"
            ))
            .into())
        }
    }
}

impl Prompt for TerminalPrompt {
    fn connection(&self) -> Result<ConnectionConfig> {
        self.ensure_interactive("connection details (pass a URL or --host/--user)")?;

        let mode = Select::new()
            .with_prompt("Connection type")
            .items(&["TCP/IP", "Unix socket"])
            .default(0)
            .interact()
            .context("failed to read connection type")?;

        let transport = if mode == 0 {
            let host: String = Input::new()
                .with_prompt("Host")
                .default("127.0.0.1".to_string())
                .interact_text()
                .context("failed to read host")?;
            let port: u16 = Input::new()
                .with_prompt("Port")
                .default(DEFAULT_PORT)
                .interact_text()
                .context("failed to read port")?;
            Transport::Tcp { host, port }
        } else {
            let path: String = Input::new()
                .with_prompt("Socket path")
                .default("/run/mysqld/mysqld.sock".to_string())
                .interact_text()
                .context("failed to read socket path")?;
            Transport::Socket {
                path: PathBuf::from(path),
            }
        };

        let user: String = Input::new()
            .with_prompt("User")
            .interact_text()
            .context("failed to read user")?;
        let password = Password::new()
            .with_prompt("Password")
            .allow_empty_password(true)
            .interact()
            .context("failed to read password")?;
        let database: String = Input::new()
            .with_prompt("Database (optional)")
            .allow_empty(true)
            .interact_text()
            .context("failed to read database")?;

        let connection = ConnectionConfig {
            transport,
            user,
            password: (!password.is_empty()).then_some(password),
            database: (!database.trim().is_empty()).then(|| database.trim().to_string()),
        };
        connection.validate()?;
        Ok(connection)
    }

    fn confirm(&self, question: &str) -> Result<bool> {
        self.ensure_interactive("confirmation (pass --yes)")?;
        let confirmed = Confirm::new()
            .with_prompt(question)
            .default(false)
            .interact()
            .context("failed to read confirmation")?;
        Ok(confirmed)
    }
}
