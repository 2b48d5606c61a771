use crate::app::App;

pub async fn run(app: &App, query: &str) -> anyhow::Result<()> {
    let hits = app.search_tool().search(query).await?;
    println!("{}", serde_json::to_string_pretty(&hits)?);
    Ok(())
}
