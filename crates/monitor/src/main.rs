//! # Thermolab Monitor
//!
//! Lê o fluxo de linhas do controlador (arquivo capturado ou stdin),
//! valida cada frame e acompanha o estado da sessão.
//!
//! Linhas da tabela vão para stdout; logs vão para stderr.
//!
//! ## Uso
//! ```bash
//! thermolab_monitor replay --input captura.txt --persist dados.csv
//! cat /dev/ttyACM0 | thermolab_monitor
//! thermolab_monitor encode 55
//! thermolab_monitor validate
//! ```

mod line_thread;
mod sink;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use line_thread::{LineMessage, spawn_reader_thread};
use sink::EffectSink;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use thermolab_core::config::AppConfig;
use thermolab_core::protocol::{FieldPolicy, PercentOnCommand, RejectReason, parse_with};
use thermolab_core::schema::{Schema, SchemaRevision};
use thermolab_core::session::{Effect, SessionTracker};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "thermolab_monitor",
    about = "Valida e acompanha a telemetria do controlador térmico"
)]
struct Cli {
    /// Caminho do config.toml (padrão: ao lado do executável).
    #[arg(long, env = "THERMOLAB_CONFIG")]
    config: Option<PathBuf>,

    /// Comando a executar. Padrão: `replay`.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Processa o fluxo de linhas até o fim (desconexão).
    Replay(ReplayArgs),
    /// Imprime a linha de comando de percentual para o dispositivo.
    Encode {
        /// Percentual do aquecedor (0–100).
        percent: String,
    },
    /// Valida a configuração e sai.
    Validate,
}

#[derive(Args, Debug, Clone, Default)]
struct ReplayArgs {
    /// Arquivo de entrada ("-" = stdin). Sobrepõe `monitor.input`.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Revisão do firmware (v1, v2, v3). Sobrepõe `protocol`.
    #[arg(long)]
    revision: Option<String>,

    /// Rejeita frames com campos não numéricos em vez de usar 0.
    #[arg(long)]
    strict: bool,

    /// Arquivo de registros persistidos. Sobrepõe `monitor.persist_path`.
    #[arg(long)]
    persist: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // ── Config ──
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if cli.config.is_none() && !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    match cli.command.unwrap_or(Command::Replay(ReplayArgs::default())) {
        Command::Replay(args) => {
            apply_overrides(&mut config, &args)?;
            replay(&config)
        }
        Command::Encode { percent } => {
            let schema = config.schema()?;
            let command = PercentOnCommand::from_input(&percent)?;
            println!("{}", command.encode(&schema));
            Ok(())
        }
        Command::Validate => {
            let errors = config.validate();
            if errors.is_empty() {
                info!("Configuração válida ({})", config_path.display());
                Ok(())
            } else {
                for e in &errors {
                    warn!("{e}");
                }
                bail!("{} erro(s) em {}", errors.len(), config_path.display())
            }
        }
    }
}

fn apply_overrides(config: &mut AppConfig, args: &ReplayArgs) -> anyhow::Result<()> {
    if let Some(name) = &args.revision {
        config.protocol.revision = SchemaRevision::from_name(name)
            .with_context(|| format!("Revisão desconhecida: {name}"))?;
        config.protocol.fields.clear();
    }
    if args.strict {
        config.protocol.field_policy = FieldPolicy::Strict;
    }
    if let Some(input) = &args.input {
        config.monitor.input = input.display().to_string();
    }
    if let Some(persist) = &args.persist {
        config.monitor.persist_path = persist.display().to_string();
    }
    Ok(())
}

fn replay(config: &AppConfig) -> anyhow::Result<()> {
    let schema = config.schema()?;
    let policy = config.protocol.field_policy;
    let mut tracker = SessionTracker::new(
        schema.clone(),
        config.session.clone(),
        config.rank_table()?,
    )?;

    // ── Fonte de linhas ──
    let capacity = config.monitor.channel_capacity;
    let input = config.monitor.input.as_str();
    let rx = if input.is_empty() || input == "-" {
        spawn_reader_thread(BufReader::new(std::io::stdin()), "stdin".into(), capacity)?
    } else {
        let file = File::open(input).with_context(|| format!("Falha ao abrir {input}"))?;
        spawn_reader_thread(BufReader::new(file), input.to_string(), capacity)?
    };

    // ── Persistência ──
    let persist = if config.monitor.persist_path.is_empty() {
        None
    } else {
        let path = &config.monitor.persist_path;
        let file = File::create(path).with_context(|| format!("Falha ao criar {path}"))?;
        info!("Gravando registros em {path}");
        Some(BufWriter::new(file))
    };

    let stdout = std::io::stdout();
    let mut sink = EffectSink::new(stdout.lock(), persist, &schema)?;

    info!(
        "Sessão iniciada: {} campos, política {:?}",
        schema.field_count(),
        policy
    );

    // ── Loop principal ──
    for msg in rx.iter() {
        let effects = effects_for(&mut tracker, &schema, policy, msg);

        for effect in &effects {
            sink.handle(effect)?;
        }

        if sink.is_fatal() {
            break;
        }
    }

    let stats = tracker.stats();
    info!(
        "Resumo: {} aceitos | {} rejeitados | {} emergências | {} alarmes",
        stats.accepted,
        stats.rejected,
        stats.emergencies,
        sink.alarms()
    );

    Ok(())
}

/// Traduz uma mensagem da thread de leitura em efeitos da sessão.
fn effects_for(
    tracker: &mut SessionTracker,
    schema: &Schema,
    policy: FieldPolicy,
    msg: LineMessage,
) -> Vec<Effect> {
    match msg {
        LineMessage::Line { text, raw_size } => {
            tracing::trace!("← {raw_size} bytes: {text}");
            tracker.apply(parse_with(&text, schema, policy))
        }
        // Linha longa demais nunca é frame; só o marcador ainda conta
        LineMessage::Oversized {
            head,
            emergency: true,
            ..
        } => tracker.apply(Err(RejectReason::EmergencyMessage(head))),
        LineMessage::Oversized { raw_size, .. } => {
            warn!("Linha de {raw_size} bytes ignorada");
            Vec::new()
        }
        LineMessage::Disconnected { reason } => {
            info!("Fluxo encerrado: {reason}");
            tracker.apply_disconnect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_to_replay() {
        let cli = Cli::try_parse_from(["thermolab_monitor"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn replay_flags_override_config() {
        let cli = Cli::try_parse_from([
            "thermolab_monitor",
            "replay",
            "--input",
            "cap.txt",
            "--revision",
            "v1",
            "--strict",
        ])
        .unwrap();
        let Some(Command::Replay(args)) = cli.command else {
            panic!("esperado replay");
        };

        let mut config = AppConfig::default();
        config.protocol.fields = vec!["time".into()];
        apply_overrides(&mut config, &args).unwrap();

        assert_eq!(config.protocol.revision, SchemaRevision::V1);
        assert!(config.protocol.fields.is_empty());
        assert_eq!(config.protocol.field_policy, FieldPolicy::Strict);
        assert_eq!(config.monitor.input, "cap.txt");
    }

    #[test]
    fn unknown_revision_is_an_error() {
        let args = ReplayArgs {
            revision: Some("v7".into()),
            ..Default::default()
        };
        assert!(apply_overrides(&mut AppConfig::default(), &args).is_err());
    }

    #[test]
    fn replay_file_to_persist() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("cap.txt");
        let output = dir.path().join("out.csv");
        std::fs::write(
            &input,
            "boot\n[55,60,0,58,57.5,0.5,0,0,0]\n[56,60,0,58.2,57.6,1.0,0,0,0]\n",
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.monitor.input = input.display().to_string();
        config.monitor.persist_path = output.display().to_string();
        replay(&config).unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        assert_eq!(written.lines().count(), 3);
        assert!(written.ends_with("56.00,60.00,0.00,58.20,57.60,1.00,0.00,0.00,0.00\n"));
    }

    fn v3_tracker() -> (SessionTracker, Schema) {
        let config = AppConfig::default();
        let schema = config.schema().unwrap();
        let tracker = SessionTracker::new(
            schema.clone(),
            config.session.clone(),
            config.rank_table().unwrap(),
        )
        .unwrap();
        (tracker, schema)
    }

    #[test]
    fn oversized_lines_never_validate_the_session() {
        let (mut tracker, schema) = v3_tracker();

        let effects = effects_for(
            &mut tracker,
            &schema,
            FieldPolicy::Lenient,
            LineMessage::Oversized {
                head: "[1,2,3,4,5,6,7,8,9]".into(),
                emergency: false,
                raw_size: 5000,
            },
        );
        assert!(effects.is_empty());
        assert!(!tracker.state().validated);

        let effects = effects_for(
            &mut tracker,
            &schema,
            FieldPolicy::Lenient,
            LineMessage::Oversized {
                head: "xxxx".into(),
                emergency: true,
                raw_size: 5000,
            },
        );
        assert!(effects.contains(&Effect::Emergency("xxxx".into())));
        assert!(!tracker.state().validated);
        assert_eq!(tracker.stats().accepted, 0);
    }

    #[test]
    fn blank_line_before_validation_flags_firmware() {
        let (mut tracker, schema) = v3_tracker();
        let effects = effects_for(
            &mut tracker,
            &schema,
            FieldPolicy::Lenient,
            LineMessage::Line {
                text: String::new(),
                raw_size: 1,
            },
        );
        assert_eq!(
            effects,
            vec![
                Effect::ParseError(RejectReason::MalformedBrackets),
                Effect::IncompatibleFirmware,
            ]
        );
    }
}
