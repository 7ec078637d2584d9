//! Deploy commands.

use anyhow::Result;
use serde_json::Value;

use super::Client;

fn print_deploy_row(deploy: &Value) {
    println!(
        "{:<36} {:<10} {:<20} {}",
        deploy["id"].as_str().unwrap_or("-"),
        deploy["status"].as_str().unwrap_or("-"),
        deploy["reference"].as_str().unwrap_or("-"),
        deploy["created_at"].as_str().unwrap_or("-"),
    );
}

pub async fn list(client: &Client, project: &str, page: usize) -> Result<()> {
    let deploys = client
        .get(&format!("/projects/{project}/deploys?page={page}"))
        .await?;
    for deploy in deploys.as_array().map(Vec::as_slice).unwrap_or_default() {
        print_deploy_row(deploy);
    }
    Ok(())
}

pub async fn active(client: &Client) -> Result<()> {
    let deploys = client.get("/deploys/active").await?;
    for deploy in deploys.as_array().map(Vec::as_slice).unwrap_or_default() {
        print_deploy_row(deploy);
    }
    Ok(())
}

pub async fn create(client: &Client, project: &str, stage: &str, reference: &str) -> Result<()> {
    let deploy = client
        .post(
            &format!("/projects/{project}/deploys"),
            Some(serde_json::json!({
                "stage_id": stage,
                "reference": reference,
            })),
        )
        .await?;
    println!(
        "Deploy {} is {}",
        deploy["id"].as_str().unwrap_or("-"),
        deploy["status"].as_str().unwrap_or("-"),
    );
    Ok(())
}

pub async fn show(client: &Client, project: &str, id: &str) -> Result<()> {
    let deploy = client
        .get(&format!("/projects/{project}/deploys/{id}"))
        .await?;
    println!("{}", serde_json::to_string_pretty(&deploy)?);
    Ok(())
}

pub async fn cancel(client: &Client, project: &str, id: &str) -> Result<()> {
    let deploy = client
        .delete(&format!("/projects/{project}/deploys/{id}"))
        .await?;
    println!(
        "Deploy {} is {}",
        deploy["id"].as_str().unwrap_or("-"),
        deploy["status"].as_str().unwrap_or("-"),
    );
    Ok(())
}

pub async fn approve(client: &Client, project: &str, id: &str) -> Result<()> {
    let deploy = client
        .post(&format!("/projects/{project}/deploys/{id}/approve"), None)
        .await?;
    println!(
        "Deploy {} approved, now {}",
        deploy["id"].as_str().unwrap_or("-"),
        deploy["status"].as_str().unwrap_or("-"),
    );
    Ok(())
}

pub async fn reject(client: &Client, project: &str, id: &str, reason: &str) -> Result<()> {
    let deploy = client
        .post(
            &format!("/projects/{project}/deploys/{id}/reject"),
            Some(serde_json::json!({ "reason": reason })),
        )
        .await?;
    println!("Deploy {} rejected", deploy["id"].as_str().unwrap_or("-"));
    Ok(())
}
