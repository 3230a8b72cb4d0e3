//! `connect`, `disconnect` and `status`.

use super::Context;
use crate::cli::{ConnectArgs, StatusArgs};
use crate::config::{ConnectionConfig, DEFAULT_PORT, Transport};
use crate::db::ServerVersion;
use crate::error::{ConfigError, InputError, Result};
use crate::output::Output;

/// Verify the connection first; only a server that answered gets saved.
pub async fn connect(args: ConnectArgs, ctx: &Context<'_>) -> Result<Output> {
    let connection = resolve(args, ctx)?;

    let mut session = ctx.connector.open(&connection).await?;
    let version = session.server_version().await;
    let closed = session.close().await;
    let version = version?;
    closed?;

    ctx.state.save(&connection)?;
    tracing::info!(target = %connection.target(), %version, "connected");

    let output = Output::status(format!(
        "Connected to {} (server {version}). Settings saved to {}.",
        connection.target(),
        ctx.state.path().display()
    ));
    if version.supports_vectors() {
        Ok(output)
    } else {
        let (major, minor) = ServerVersion::MINIMUM;
        tracing::warn!(%version, "server predates vector support");
        Ok(output.with_warning(format!(
            "server {version} is not MariaDB {major}.{minor} or newer; VECTOR, Spider and ColumnStore commands may fail"
        )))
    }
}

fn resolve(args: ConnectArgs, ctx: &Context<'_>) -> Result<ConnectionConfig> {
    if let Some(url) = &args.url {
        let mut connection = ConnectionConfig::from_url(url)?;
        if connection.password.is_none() {
            connection.password = args.password;
        }
        return Ok(connection);
    }
    if args.host.is_none() && args.socket.is_none() && args.user.is_none() {
        return ctx.prompt.connection();
    }

    let user = args.user.ok_or_else(|| {
        InputError::Missing("--user is required unless a connection URL is given".into())
    })?;
    let transport = match args.socket {
        Some(path) => Transport::Socket { path },
        None => Transport::Tcp {
            host: args.host.unwrap_or_else(|| "localhost".to_string()),
            port: args.port.unwrap_or(DEFAULT_PORT),
        },
    };

    let connection = ConnectionConfig {
        transport,
        user,
        password: args.password,
        database: args.database,
    };
    connection.validate()?;
    Ok(connection)
}

pub fn disconnect(ctx: &Context<'_>) -> Result<Output> {
    if ctx.state.clear()? {
        Ok(Output::status(format!(
            "Disconnected. Removed {}.",
            ctx.state.path().display()
        )))
    } else {
        Err(ConfigError::NotConnected {
            path: ctx.state.path().to_path_buf(),
        }
        .into())
    }
}

pub async fn status(args: StatusArgs, ctx: &Context<'_>) -> Result<Output> {
    let connection = ctx.state.load()?;
    let mut message = format!(
        "Connected to {} (config {}).",
        connection.target(),
        ctx.state.path().display()
    );

    if args.ping {
        let mut session = ctx.connector.open(&connection).await?;
        let version = session.server_version().await;
        let closed = session.close().await;
        let version = version?;
        closed?;
        message.push_str(&format!("\nServer version: {version}"));
    }

    Ok(Output::status(message))
}
