//! Protocolo de linha do controlador.
//!
//! Cada linha enviada pelo firmware é um array textual:
//!
//! ```text
//! [v0,v1,v2,...,vN-1]
//! ```
//!
//! - `N` = número de campos do [`Schema`]
//! - Cada `vi` é decimal, `nan`, `inf`/`-inf` ou vazio
//! - Uma linha contendo `!` é uma mensagem de emergência, não um frame
//!
//! Comandos de saída usam a mesma convenção de colchetes: o primeiro slot é
//! o percentual do aquecedor e os demais ficam vazios.

use crate::numeric;
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Marcador de mensagem fora de banda (ex: superaquecimento).
pub const EMERGENCY_MARKER: char = '!';

pub const OPEN_BRACKET: char = '[';
pub const CLOSE_BRACKET: char = ']';
pub const SEPARATOR: char = ',';

/// Faixa válida do comando de percentual.
pub const PERCENT_ON_MIN: f32 = 0.0;
pub const PERCENT_ON_MAX: f32 = 100.0;

/// Motivos de rejeição de uma linha.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RejectReason {
    #[error("Array inválido: esperado exatamente um '[' e um ']'")]
    MalformedBrackets,

    #[error("Número de campos incorreto: {found} (esperado {expected})")]
    FieldCountMismatch { expected: usize, found: usize },

    #[error("Mensagem de emergência: {0}")]
    EmergencyMessage(String),

    #[error("Campo {index} não numérico: {text:?}")]
    MalformedField { index: usize, text: String },
}

impl RejectReason {
    /// Falha de parse (recuperável), em oposição a um alarme fora de banda.
    pub fn is_parse_error(&self) -> bool {
        !matches!(self, RejectReason::EmergencyMessage(_))
    }
}

/// Como tratar campos que não convertem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldPolicy {
    /// Campo inválido vira `0.0`; mantém paridade com logs históricos.
    #[default]
    Lenient,
    /// Campo vazio ou não numérico rejeita o frame inteiro.
    Strict,
}

/// Uma amostra de telemetria decodificada, na ordem do fio.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    values: Vec<f32>,
}

impl Frame {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        self.values.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }
}

/// Resultado do parse de uma linha.
pub type ParseOutcome = Result<Frame, RejectReason>;

// ──────────────────────────────────────────────
// Decode
// ──────────────────────────────────────────────

/// Faz o parse de uma linha com a política histórica ([`FieldPolicy::Lenient`]).
pub fn parse(line: &str, schema: &Schema) -> ParseOutcome {
    parse_with(line, schema, FieldPolicy::Lenient)
}

/// Faz o parse de uma linha crua do controlador.
///
/// Tudo ou nada: qualquer rejeição descarta a linha inteira. Não guarda
/// estado entre chamadas.
pub fn parse_with(line: &str, schema: &Schema, policy: FieldPolicy) -> ParseOutcome {
    if line.contains(EMERGENCY_MARKER) {
        return Err(RejectReason::EmergencyMessage(line.to_string()));
    }

    let (mut opens, mut closes, mut commas) = (0usize, 0usize, 0usize);
    for c in line.chars() {
        match c {
            OPEN_BRACKET => opens += 1,
            CLOSE_BRACKET => closes += 1,
            SEPARATOR => commas += 1,
            _ => {}
        }
    }

    if opens != 1 || closes != 1 {
        debug!("Parse: array inválido ({opens} '[', {closes} ']')");
        return Err(RejectReason::MalformedBrackets);
    }

    // O '[' precisa vir antes do ']'
    let body_start = match (line.find(OPEN_BRACKET), line.find(CLOSE_BRACKET)) {
        (Some(open), Some(close)) if open < close => open + OPEN_BRACKET.len_utf8(),
        _ => {
            debug!("Parse: ']' antes de '['");
            return Err(RejectReason::MalformedBrackets);
        }
    };

    let expected = schema.field_count();
    let found = commas + 1;
    if found != expected {
        debug!("Parse: {found} campos, esperado {expected}");
        return Err(RejectReason::FieldCountMismatch { expected, found });
    }

    // Slots começam logo após o '[' e terminam em ',' ou ']'
    let mut rest = &line[body_start..];

    let mut values = Vec::with_capacity(expected);
    for index in 0..expected {
        let end = rest.find([SEPARATOR, CLOSE_BRACKET]).unwrap_or(rest.len());
        let slot = &rest[..end];
        values.push(decode_field(index, slot, policy)?);
        rest = rest.get(end + 1..).unwrap_or_default();
    }

    Ok(Frame::new(values))
}

fn decode_field(index: usize, slot: &str, policy: FieldPolicy) -> Result<f32, RejectReason> {
    match policy {
        FieldPolicy::Lenient => {
            let looks_numeric = slot.bytes().any(|b| b.is_ascii_digit());
            match numeric::parse_prefix(slot) {
                Some(v) if looks_numeric || !v.is_finite() => Ok(v),
                _ => {
                    if !slot.is_empty() {
                        trace!("Campo {index} ({slot:?}) não converte, usando 0");
                    }
                    Ok(0.0)
                }
            }
        }
        FieldPolicy::Strict => numeric::parse_exact(slot).ok_or_else(|| {
            RejectReason::MalformedField {
                index,
                text: slot.to_string(),
            }
        }),
    }
}

// ──────────────────────────────────────────────
// Encode
// ──────────────────────────────────────────────

/// Notação canônica `[v0,v1,...]` de um frame.
///
/// Usa a formatação mais curta que preserva o valor, então
/// `parse(encode_frame(v))` devolve `v` para valores finitos.
pub fn encode_frame(values: &[f32]) -> String {
    let body: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("{OPEN_BRACKET}{}{CLOSE_BRACKET}", body.join(","))
}

/// Erros ao montar um comando de saída.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("Valor de percentual vazio")]
    Empty,

    #[error("O valor de percentual não é numérico: {0:?}")]
    NotNumeric(String),

    #[error("O valor de percentual está fora da faixa ({PERCENT_ON_MIN}–{PERCENT_ON_MAX}): {0}")]
    OutOfRange(f32),
}

/// Comando de potência do aquecedor enviado ao controlador.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentOnCommand {
    value: f32,
}

impl PercentOnCommand {
    pub fn new(value: f32) -> Result<Self, CommandError> {
        if !(PERCENT_ON_MIN..=PERCENT_ON_MAX).contains(&value) {
            return Err(CommandError::OutOfRange(value));
        }
        Ok(Self { value })
    }

    /// Valida texto digitado pelo usuário. Espaços são removidos.
    pub fn from_input(text: &str) -> Result<Self, CommandError> {
        let cleaned: String = text.chars().filter(|c| *c != ' ').collect();
        if cleaned.is_empty() {
            return Err(CommandError::Empty);
        }
        let value = numeric::parse_exact(&cleaned).ok_or(CommandError::NotNumeric(cleaned))?;
        Self::new(value)
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Linha de comando com um slot por campo do esquema (ex: `[55.0,,,,,,,,]`).
    pub fn encode(&self, schema: &Schema) -> String {
        let padding = SEPARATOR
            .to_string()
            .repeat(schema.field_count().saturating_sub(1));
        format!("{OPEN_BRACKET}{:?}{padding}{CLOSE_BRACKET}", self.value)
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
