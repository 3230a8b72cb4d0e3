use crate::cli::InstallEngineArgs;
use crate::db::Session;
use crate::error::Result;
use crate::output::Output;
use crate::schema::Identifier;

pub async fn list(session: &mut dyn Session) -> Result<Output> {
    let engines = session.list_engines().await?;
    Ok(Output::Engines { engines })
}

pub async fn install(args: InstallEngineArgs, session: &mut dyn Session) -> Result<Output> {
    let soname = Identifier::parse("plugin", &args.soname)?;
    session.install_engine(&soname).await?;
    tracing::info!(%soname, "plugin installed");
    Ok(Output::status(format!("Installed plugin `{soname}`.")))
}
