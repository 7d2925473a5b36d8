//! # Thermolab Core
//!
//! Protocolo de linha do controlador do laboratório térmico, validação dos
//! frames e máquina de estados da sessão.
//!
//! Fluxo: linha crua → [`protocol::parse`] → [`session::SessionTracker::apply`]
//! → lista de [`session::Effect`] consumida pela interface.
//!
//! ## Módulos
//! - [`schema`] – Campos e revisões de firmware
//! - [`numeric`] – Conversão numérica permissiva (estilo `strtof`)
//! - [`protocol`] – Parse de frames `[v0,...,vN]` e comandos de saída
//! - [`rank`] – Faixas de pontuação
//! - [`session`] – Estado da conexão e efeitos
//! - [`config`] – Configuração unificada via TOML

pub mod schema;
pub mod numeric;
pub mod protocol;
pub mod rank;
pub mod session;
pub mod config;

// Re-exports convenientes
pub use schema::{Role, Schema, SchemaRevision};
pub use protocol::{parse, parse_with, FieldPolicy, Frame, ParseOutcome, RejectReason};
pub use rank::RankTable;
pub use session::{Effect, SessionConfig, SessionTracker};
pub use config::AppConfig;
