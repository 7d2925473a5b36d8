//! Classificação da pontuação em faixas nomeadas.
//!
//! A tabela é avaliada da faixa mais apertada para a mais larga; os limites
//! são inclusivos, então um empate na fronteira fica na faixa melhor.

use serde::{Deserialize, Serialize};

/// Erros de montagem da tabela.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RankError {
    #[error("Limite de faixa inválido: {0}")]
    NonFiniteBound(f32),

    #[error("Limites de faixa devem ser crescentes ({previous} seguido de {next})")]
    NotAscending { previous: f32, next: f32 },

    #[error("Rótulo de faixa vazio")]
    EmptyLabel,
}

/// Uma faixa: pontuações `<= max` recebem `label`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub max: f32,
    pub label: String,
}

impl Tier {
    pub fn new(max: f32, label: impl Into<String>) -> Self {
        Self {
            max,
            label: label.into(),
        }
    }
}

/// Tabela ordenada de faixas com um rótulo final sem limite.
#[derive(Debug, Clone, PartialEq)]
pub struct RankTable {
    tiers: Vec<Tier>,
    fallback: String,
}

impl RankTable {
    pub fn new(tiers: Vec<Tier>, fallback: impl Into<String>) -> Result<Self, RankError> {
        let fallback = fallback.into();
        if fallback.trim().is_empty() || tiers.iter().any(|t| t.label.trim().is_empty()) {
            return Err(RankError::EmptyLabel);
        }
        for tier in &tiers {
            if !tier.max.is_finite() {
                return Err(RankError::NonFiniteBound(tier.max));
            }
        }
        for pair in tiers.windows(2) {
            if pair[1].max <= pair[0].max {
                return Err(RankError::NotAscending {
                    previous: pair[0].max,
                    next: pair[1].max,
                });
            }
        }
        Ok(Self { tiers, fallback })
    }

    /// Rótulo da pontuação. NaN cai no rótulo final.
    pub fn rank(&self, score: f32) -> &str {
        self.tiers
            .iter()
            .find(|t| score <= t.max)
            .map(|t| t.label.as_str())
            .unwrap_or(self.fallback.as_str())
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Tabela padrão.
    pub fn standard() -> Self {
        Self {
            tiers: vec![
                Tier::new(13.0, "Control Master"),
                Tier::new(16.0, "Control Student"),
                Tier::new(20.0, "Learner"),
            ],
            fallback: "Crash Test Dummy".into(),
        }
    }

    /// As cinco faixas da interface original do laboratório.
    pub fn classic() -> Self {
        Self {
            tiers: vec![
                Tier::new(13.0, "Control Master"),
                Tier::new(16.0, "Control Student"),
                Tier::new(20.0, "Proud owner of a learners permit"),
                Tier::new(50.0, "Accident waiting to happen"),
            ],
            fallback: "Professional Crash test dummy".into(),
        }
    }

    /// Retorna tabela pelo nome.
    pub fn preset(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "classic" => Self::classic(),
            _ => Self::standard(),
        }
    }
}

impl Default for RankTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Nomes de tabelas disponíveis.
pub fn preset_names() -> Vec<&'static str> {
    vec!["standard", "classic"]
}
