use crate::repolens::RepositoryManager;
use crate::tools::RepoLensTools;
use anyhow::Result;
use rmcp::ServiceExt;
use rmcp::transport::stdio;

/// Serves the repository tools over stdin/stdout until the client disconnects
pub async fn run_stdio_server(manager: RepositoryManager, authenticated: bool) -> Result<()> {
    let service = RepoLensTools::new(manager, authenticated);

    let server = service.serve(stdio()).await?;

    server.waiting().await?;
    Ok(())
}
