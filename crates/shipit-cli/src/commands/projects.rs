//! Project commands.

use anyhow::{Result, bail};

use super::Client;

pub async fn list(client: &Client) -> Result<()> {
    let projects = client.get("/projects").await?;
    for project in projects.as_array().map(Vec::as_slice).unwrap_or_default() {
        println!(
            "{:<24} {:<24} {}",
            project["permalink"].as_str().unwrap_or("-"),
            project["name"].as_str().unwrap_or("-"),
            project["repository"].as_str().unwrap_or("-"),
        );
    }
    Ok(())
}

pub async fn create(client: &Client, name: &str, repository: &str) -> Result<()> {
    let Some((owner, repo_name)) = repository.split_once('/') else {
        bail!("repository must be owner/name, got {repository}");
    };

    let project = client
        .post(
            "/projects",
            Some(serde_json::json!({
                "name": name,
                "repository_owner": owner,
                "repository_name": repo_name,
            })),
        )
        .await?;
    println!(
        "Created project {} ({})",
        project["permalink"].as_str().unwrap_or("-"),
        project["id"].as_str().unwrap_or("-"),
    );
    Ok(())
}

pub async fn stages(client: &Client, project: &str) -> Result<()> {
    let stages = client.get(&format!("/projects/{project}/stages")).await?;
    for stage in stages.as_array().map(Vec::as_slice).unwrap_or_default() {
        let mut flags = Vec::new();
        if stage["requires_approval"].as_bool().unwrap_or(false) {
            flags.push("buddy-check");
        }
        if stage["allow_concurrent"].as_bool().unwrap_or(false) {
            flags.push("concurrent");
        }
        if stage["auto_deploy"].as_bool().unwrap_or(false) {
            flags.push("auto-deploy");
        }
        println!(
            "{:<36} {:<16} {}",
            stage["id"].as_str().unwrap_or("-"),
            stage["name"].as_str().unwrap_or("-"),
            flags.join(","),
        );
    }
    Ok(())
}
