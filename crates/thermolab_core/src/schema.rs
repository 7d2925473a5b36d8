//! Esquema dos frames de telemetria.
//!
//! Cada revisão de firmware do controlador envia um array com número e
//! ordem de campos diferentes. O [`Schema`] descreve essa ordem e é
//! passado explicitamente ao parser e ao [`SessionTracker`](crate::session::SessionTracker);
//! não existe índice global de campos.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Erros de construção de esquema. São fatais na inicialização, nunca em runtime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Esquema vazio: pelo menos um campo é necessário")]
    Empty,

    #[error("Campo duplicado no esquema: {0}")]
    DuplicateRole(Role),

    #[error("Campo desconhecido: {0:?}")]
    UnknownField(String),

    #[error("Esquema não possui o campo obrigatório {0}")]
    MissingRole(Role),
}

// ──────────────────────────────────────────────
// Papéis dos campos
// ──────────────────────────────────────────────

/// Papel semântico de uma posição do frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Potência do aquecedor (0–100%)
    PercentOn,
    /// Temperatura alvo (°C)
    SetPoint,
    /// Velocidade do ventilador (só na revisão 3)
    FanSpeed,
    /// Temperatura medida (°C)
    Temperature,
    /// Temperatura filtrada (°C)
    TemperatureFiltered,
    /// Tempo desde o início do experimento (min)
    Time,
    /// Variância da entrada
    InputVariance,
    /// Erro médio
    AverageError,
    /// Pontuação acumulada
    Score,
}

impl Role {
    pub const ALL: [Role; 9] = [
        Role::PercentOn,
        Role::SetPoint,
        Role::FanSpeed,
        Role::Temperature,
        Role::TemperatureFiltered,
        Role::Time,
        Role::InputVariance,
        Role::AverageError,
        Role::Score,
    ];

    /// Nome estável usado na configuração e nos cabeçalhos.
    pub fn name(self) -> &'static str {
        match self {
            Role::PercentOn => "percent_on",
            Role::SetPoint => "set_point",
            Role::FanSpeed => "fan_speed",
            Role::Temperature => "temperature",
            Role::TemperatureFiltered => "temperature_filtered",
            Role::Time => "time",
            Role::InputVariance => "input_variance",
            Role::AverageError => "average_error",
            Role::Score => "score",
        }
    }

    /// Rótulo para exibição.
    pub fn label(self) -> &'static str {
        match self {
            Role::PercentOn => "Percent On",
            Role::SetPoint => "Set Point",
            Role::FanSpeed => "Fan Speed",
            Role::Temperature => "Temperature",
            Role::TemperatureFiltered => "Filtered Temperature",
            Role::Time => "Time",
            Role::InputVariance => "Input Variance",
            Role::AverageError => "Average Error",
            Role::Score => "Score",
        }
    }

    /// Resolve um nome de campo (case-insensitive).
    pub fn from_name(name: &str) -> Option<Role> {
        let name = name.trim();
        Role::ALL
            .into_iter()
            .find(|role| role.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ──────────────────────────────────────────────
// Schema
// ──────────────────────────────────────────────

/// Descrição ordenada dos campos esperados em um frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Role>,
}

impl Schema {
    pub fn new(fields: Vec<Role>) -> Result<Self, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::Empty);
        }
        for (i, role) in fields.iter().enumerate() {
            if fields[..i].contains(role) {
                return Err(SchemaError::DuplicateRole(*role));
            }
        }
        Ok(Self { fields })
    }

    /// Constrói a partir de nomes de campo, na ordem do fio.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, SchemaError> {
        let fields = names
            .iter()
            .map(|n| {
                Role::from_name(n.as_ref())
                    .ok_or_else(|| SchemaError::UnknownField(n.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(fields)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|r| r.name()).collect()
    }

    pub fn roles(&self) -> &[Role] {
        &self.fields
    }

    pub fn index_of(&self, role: Role) -> Option<usize> {
        self.fields.iter().position(|r| *r == role)
    }

    /// Como [`index_of`](Self::index_of), mas falha fechado.
    pub fn require(&self, role: Role) -> Result<usize, SchemaError> {
        self.index_of(role).ok_or(SchemaError::MissingRole(role))
    }
}

// ──────────────────────────────────────────────
// Revisões de firmware
// ──────────────────────────────────────────────

/// Revisões conhecidas do firmware do controlador.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaRevision {
    /// 5 campos, sem métricas de desempenho
    V1,
    /// 8 campos
    V2,
    /// 9 campos, com ventilador
    #[default]
    V3,
}

impl SchemaRevision {
    pub fn roles(self) -> &'static [Role] {
        use Role::*;
        match self {
            SchemaRevision::V1 => &[PercentOn, SetPoint, Temperature, TemperatureFiltered, Time],
            SchemaRevision::V2 => &[
                PercentOn,
                SetPoint,
                Temperature,
                TemperatureFiltered,
                Time,
                InputVariance,
                AverageError,
                Score,
            ],
            SchemaRevision::V3 => &[
                PercentOn,
                SetPoint,
                FanSpeed,
                Temperature,
                TemperatureFiltered,
                Time,
                InputVariance,
                AverageError,
                Score,
            ],
        }
    }

    pub fn schema(self) -> Schema {
        // Listas estáticas acima não têm duplicatas
        Schema {
            fields: self.roles().to_vec(),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "v1" | "1" => Some(SchemaRevision::V1),
            "v2" | "2" => Some(SchemaRevision::V2),
            "v3" | "3" => Some(SchemaRevision::V3),
            _ => None,
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
