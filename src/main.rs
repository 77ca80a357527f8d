use anyhow::Context;
use clap::Parser;
use neon_provisioner::config::{Command, LogFormat};
use neon_provisioner::domain::model::{ResourceAddress, ResourceKind};
use neon_provisioner::utils::{logger, validation::Validate};
use neon_provisioner::{
    ApiClient, CliConfig, LocalStorage, PollPolicy, ProviderConfig, Reconciler, ResourceRegistry,
};
use serde::Serialize;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    match cli.log_format {
        LogFormat::Compact => logger::init_cli_logger(cli.verbose),
        LogFormat::Json => logger::init_json_logger(cli.verbose),
    }

    if let Err(e) = run(cli).await {
        tracing::error!("❌ {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: CliConfig) -> anyhow::Result<()> {
    tracing::debug!("CLI config: {:?}", cli);

    let config = ProviderConfig::from_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config))?;
    config.validate()?;

    let client = ApiClient::from_config(&config)?;
    let registry = ResourceRegistry::new(client, PollPolicy::from_config(&config));
    let storage = LocalStorage::new(config.state.path.clone());
    let engine = Reconciler::new(registry, storage);

    match cli.command {
        Command::Apply => {
            let results = engine.apply(&config).await?;
            print_json(&Reconciler::<LocalStorage>::apply_summary(&results))?;
            print_json(&results)?;
        }
        Command::Plan => print_json(&engine.plan(&config).await?)?,
        Command::Destroy => {
            let results = engine.destroy(&config).await?;
            print_json(&Reconciler::<LocalStorage>::apply_summary(&results))?;
        }
        Command::Create { address } => {
            let (address, attributes) = declared(&engine, &config, &address).await?;
            print_json(&engine.create(&address, &attributes).await?)?;
        }
        Command::Read { address } => {
            let address: ResourceAddress = address.parse()?;
            match engine.read(&address).await? {
                Some(record) => print_json(&record)?,
                None => tracing::warn!("⚠️ {} no longer exists; state removed", address),
            }
        }
        Command::Update { address } => {
            let (address, attributes) = declared(&engine, &config, &address).await?;
            print_json(&engine.update(&address, &attributes).await?)?;
        }
        Command::Delete { address } => {
            let address: ResourceAddress = address.parse()?;
            engine.delete(&address).await?;
            tracing::info!("🗑️ {} deleted", address);
        }
        Command::Import { address, id } => {
            let address: ResourceAddress = address.parse()?;
            print_json(&engine.import(&address, &id).await?)?;
        }
        Command::Lookup { kind, id } => {
            let kind: ResourceKind = kind.parse()?;
            print_json(&engine.lookup(kind, &id).await?)?;
        }
        Command::Show { address } => {
            let address: ResourceAddress = address.parse()?;
            print_json(&engine.show(&address).await?)?;
        }
    }

    Ok(())
}

/// 取得宣告的屬性，並以已保存的狀態解析引用
async fn declared(
    engine: &Reconciler<LocalStorage>,
    config: &ProviderConfig,
    address: &str,
) -> anyhow::Result<(ResourceAddress, serde_json::Value)> {
    let address: ResourceAddress = address.parse()?;
    let resource = config
        .find_resource(&address)
        .with_context(|| format!("{} is not declared in the manifest", address))?;
    let context = engine.stored_context(config).await?;
    let attributes = context.resolve(&address.to_string(), &resource.attributes_value())?;
    Ok((address, attributes))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
