//! Command dispatch.
//!
//! `connect`, `disconnect` and `status` work on the state file directly. Every
//! other command loads the saved connection, opens one session, runs its
//! handler, and closes the session whether or not the handler succeeded.

pub mod analytics;
pub mod connection;
pub mod engines;
pub mod tables;
pub mod vectors;

use crate::cli::{Command, SessionCommand};
use crate::config::StateFile;
use crate::db::{Connector, Session};
use crate::error::Result;
use crate::output::Output;
use crate::prompt::Prompt;

/// Everything a handler may touch outside its arguments.
pub struct Context<'a> {
    pub state: StateFile,
    pub connector: &'a dyn Connector,
    pub prompt: &'a dyn Prompt,
}

pub async fn dispatch(command: Command, ctx: &Context<'_>) -> Result<Output> {
    match command {
        Command::Connect(args) => connection::connect(args, ctx).await,
        Command::Disconnect => connection::disconnect(ctx),
        Command::Status(args) => connection::status(args, ctx).await,
        Command::Session(command) => {
            let connection = ctx.state.load()?;
            let mut session = ctx.connector.open(&connection).await?;

            let result = run(command, session.as_mut(), ctx.prompt).await;
            let closed = session.close().await;
            if let Err(error) = &closed {
                tracing::warn!(%error, "failed to close session");
            }

            let output = result?;
            closed?;
            Ok(output)
        }
    }
}

async fn run(command: SessionCommand, session: &mut dyn Session, prompt: &dyn Prompt) -> Result<Output> {
    match command {
        SessionCommand::CreateIndex(args) => tables::create_index(args, session).await,
        SessionCommand::InsertVectors(args) => vectors::insert(args, session).await,
        SessionCommand::SearchVectors(args) => vectors::search(args, session).await,
        SessionCommand::ListTables(args) => tables::list_tables(args, session).await,
        SessionCommand::ListDatabases(args) => tables::list_databases(args, session).await,
        SessionCommand::GetAll(args) => tables::get_all(args, session).await,
        SessionCommand::UpdateVectors(args) => vectors::update(args, session).await,
        SessionCommand::DeleteVectors(args) => vectors::delete(args, session, prompt).await,
        SessionCommand::DeleteTable(args) => tables::delete_table(args, session, prompt).await,
        SessionCommand::InitAnalytics(args) => analytics::init(args, session).await,
        SessionCommand::RunAnalytics(args) => analytics::run(args, session).await,
        SessionCommand::ListEngines => engines::list(session).await,
        SessionCommand::InstallEngine(args) => engines::install(args, session).await,
    }
}
