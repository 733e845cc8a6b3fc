use quest::{get_settings, setup_logger, Application};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (settings, command) = get_settings()?;
    setup_logger(
        settings.level.clone(),
        vec![
            String::from("hyper"),
            String::from("reqwest"),
            String::from("sqlx"),
        ],
    )?;
    let application = Application::build(settings).await?;

    application.run(command).await?;
    Ok(())
}
