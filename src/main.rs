mod cli;

use clap::Parser;
use log::info;
use std::sync::Arc;

use docrec::config::Config;
use docrec::services::{EngineRegistry, OcrCoordinator};

use cli::{Cli, Commands};

fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::new();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Не удалось создать runtime: {}", e);
            std::process::exit(1);
        }
    };

    rt.block_on(async {
        let registry = Arc::new(EngineRegistry::probe(&config).await);
        info!("Движков доступно: {}", registry.len());
        let coordinator = OcrCoordinator::new(registry, config);

        match cli.command {
            Commands::Engines => cli::handle_engines(&coordinator).await,
            Commands::Health => cli::handle_health(&coordinator).await,
            Commands::Process {
                file,
                engine,
                lang,
                confidence_threshold,
                refine,
            } => {
                cli::handle_process(
                    &coordinator,
                    &file,
                    &engine,
                    lang,
                    confidence_threshold,
                    refine,
                )
                .await
            }
            Commands::Compare { file, engines, lang } => {
                cli::handle_compare(&coordinator, &file, engines, lang).await
            }
        }
    });
}
