//! Configuração unificada via TOML.
//!
//! Um único `config.toml` ao lado do executável define a revisão do
//! protocolo, os limiares da sessão, a tabela de faixas e as opções do monitor.

use crate::protocol::FieldPolicy;
use crate::rank::{RankError, RankTable, Tier, preset_names};
use crate::schema::{Schema, SchemaError, SchemaRevision};
use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Erros de configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro ao ler/gravar {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Erro ao serializar configuração: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Esquema inválido: {0}")]
    Schema(#[from] SchemaError),

    #[error("Tabela de faixas inválida: {0}")]
    Rank(#[from] RankError),
}

/// Formato do frame esperado do dispositivo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Revisão do firmware: "v1", "v2" ou "v3"
    pub revision: SchemaRevision,
    /// Lista de campos customizada (substitui a revisão quando não vazia)
    pub fields: Vec<String>,
    /// "lenient" (campo inválido = 0) ou "strict"
    pub field_policy: FieldPolicy,
}

impl ProtocolConfig {
    pub fn schema(&self) -> Result<Schema, SchemaError> {
        if self.fields.is_empty() {
            Ok(self.revision.schema())
        } else {
            Schema::from_names(self.fields.as_slice())
        }
    }
}

/// Tabela de faixas de pontuação.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankConfig {
    /// "standard" ou "classic"
    pub preset: String,
    /// Faixas customizadas (substituem o preset quando não vazias)
    pub tiers: Vec<Tier>,
    /// Rótulo acima de todas as faixas customizadas
    pub fallback: String,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            preset: "standard".into(),
            tiers: Vec::new(),
            fallback: String::new(),
        }
    }
}

impl RankConfig {
    pub fn table(&self) -> Result<RankTable, RankError> {
        if self.tiers.is_empty() {
            return Ok(RankTable::preset(&self.preset));
        }
        RankTable::new(self.tiers.clone(), self.fallback.clone())
    }
}

/// Opções do monitor de linha de comando.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Arquivo com o fluxo serial capturado (vazio = stdin)
    pub input: String,
    /// Arquivo de registros persistidos (vazio = desabilitado)
    pub persist_path: String,
    /// Capacidade do channel entre a thread de leitura e a sessão
    pub channel_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            input: String::new(),
            persist_path: String::new(),
            channel_capacity: 256,
        }
    }
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub protocol: ProtocolConfig,
    pub session: SessionConfig,
    pub rank: RankConfig,
    pub monitor: MonitorConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    pub fn schema(&self) -> Result<Schema, ConfigError> {
        Ok(self.protocol.schema()?)
    }

    pub fn rank_table(&self) -> Result<RankTable, ConfigError> {
        Ok(self.rank.table()?)
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        match self.protocol.schema() {
            Ok(schema) => {
                if let Err(e) = schema.require(crate::schema::Role::Time) {
                    errors.push(e.to_string());
                }
            }
            Err(e) => errors.push(format!("Esquema inválido: {e}")),
        }

        if let Err(e) = self.rank.table() {
            errors.push(format!("Tabela de faixas inválida: {e}"));
        }
        if self.rank.tiers.is_empty()
            && !preset_names()
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&self.rank.preset))
        {
            errors.push(format!(
                "Preset de faixas desconhecido: {:?} (disponíveis: {})",
                self.rank.preset,
                preset_names().join(", ")
            ));
        }

        let session = &self.session;
        if !session.metrics_after.is_finite() || session.metrics_after < 0.0 {
            errors.push(format!(
                "Tempo de exibição das métricas inválido: {}",
                session.metrics_after
            ));
        }
        if !session.score_after.is_finite() || session.score_after < 0.0 {
            errors.push(format!(
                "Tempo de exibição da pontuação inválido: {}",
                session.score_after
            ));
        }
        if session.score_after <= session.metrics_after {
            errors.push(format!(
                "Pontuação ({}) deve aparecer depois das métricas ({})",
                session.score_after, session.metrics_after
            ));
        }
        if session.overheat_marker.trim().is_empty() {
            errors.push("Marcador de superaquecimento vazio desativa o alarme".into());
        }

        if self.monitor.channel_capacity == 0 {
            errors.push("Capacidade do channel não pode ser 0".into());
        }

        errors
    }
}
