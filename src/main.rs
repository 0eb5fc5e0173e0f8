use clap::Parser;
use exploration_model::cli::commands::{cmd_load, cmd_record, cmd_verify};
use exploration_model::cli::config::{
    Cli, Commands, build_loader_config, build_model_config, load_config,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // -v raises the default level; RUST_LOG still wins
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Record {
            input,
            app,
            output_dir,
            screenshots,
        } => {
            let mut model_config = build_model_config(&config.model, &app, output_dir.as_deref());
            model_config.dump_screenshots |= screenshots;
            cmd_record(&input, model_config)?;
        }
        Commands::Load {
            app,
            dir,
            sequential,
            autofix,
            workers,
            renames,
        } => {
            let model_config = build_model_config(&config.model, &app, dir.as_deref());
            let loader = build_loader_config(&config.loader, sequential, autofix, workers, &renames)?;
            if !cmd_load(&model_config, &loader)? {
                std::process::exit(1);
            }
        }
        Commands::Verify { app, dir, autofix } => {
            let model_config = build_model_config(&config.model, &app, dir.as_deref());
            let loader = build_loader_config(&config.loader, false, autofix, None, &[])?;
            if !cmd_verify(&model_config, &loader)? {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
