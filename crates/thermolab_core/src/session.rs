//! Máquina de estados da sessão com o controlador.
//!
//! O [`SessionTracker`] consome resultados de parse na ordem de chegada e
//! devolve uma lista de [`Effect`]s para a camada de apresentação. Ele não
//! faz I/O: exibir, gravar e tocar alarmes é responsabilidade de quem chama.

use crate::protocol::{Frame, ParseOutcome, RejectReason};
use crate::rank::RankTable;
use crate::schema::{Role, Schema, SchemaError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Limiares de exibição e marcador de alarme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Tempo após o qual erro médio e variância da entrada aparecem
    pub metrics_after: f32,
    /// Tempo após o qual a pontuação e a faixa aparecem
    pub score_after: f32,
    /// Texto (case-insensitive) que identifica superaquecimento numa emergência
    pub overheat_marker: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            metrics_after: 18.0,
            score_after: 29.0,
            overheat_marker: "overheat".into(),
        }
    }
}

/// Estado acumulado da conexão.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Pelo menos um frame válido foi recebido. Nunca volta a `false`.
    pub validated: bool,
    /// Último frame aceito
    pub last_frame: Option<Frame>,
    /// Dispositivo desconectado. Terminal.
    pub fatal: bool,
}

/// Contadores da sessão.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub accepted: u64,
    pub rejected: u64,
    pub emergencies: u64,
}

/// Pontuação com a faixa correspondente.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReading {
    pub score: f32,
    pub rank: String,
}

/// Erro médio e variância da entrada.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub average_error: f32,
    pub input_variance: f32,
}

/// Linha da tabela de exibição.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayRow {
    pub time: f32,
    /// Colunas na ordem da tabela (tempo, percentual, temperaturas, set point…)
    pub columns: Vec<(Role, f32)>,
    /// Presente só após `metrics_after`
    pub metrics: Option<Metrics>,
    /// Presente só após `score_after`
    pub score: Option<ScoreReading>,
}

/// Registro de persistência: todos os campos na ordem do fio.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistRecord {
    pub values: Vec<f32>,
}

impl PersistRecord {
    /// Valores com duas casas decimais, separados por vírgula.
    pub fn to_line(&self) -> String {
        self.values
            .iter()
            .map(|v| format!("{v:.2}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Instrução para a camada de apresentação.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Habilita o campo de comando (primeiro frame válido)
    EnableInput,
    ClearEmergency,
    Display(DisplayRow),
    Persist(PersistRecord),
    /// Diagnóstico de linha descartada
    ParseError(RejectReason),
    /// Nenhum frame válido ainda: provavelmente o programa errado no dispositivo
    IncompatibleFirmware,
    /// Texto de emergência, exibido literalmente
    Emergency(String),
    /// Alarme sonoro
    Alarm,
    FinalScore(Option<ScoreReading>),
    FatalDisconnect,
}

/// Colunas da tabela de exibição, na ordem da interface.
const DISPLAY_COLUMNS: [Role; 6] = [
    Role::Time,
    Role::PercentOn,
    Role::Temperature,
    Role::TemperatureFiltered,
    Role::SetPoint,
    Role::FanSpeed,
];

/// Índices resolvidos uma vez na construção.
#[derive(Debug, Clone)]
struct FieldIndex {
    time: usize,
    columns: Vec<(Role, usize)>,
    metrics: Option<(usize, usize)>,
    score: Option<usize>,
}

impl FieldIndex {
    fn resolve(schema: &Schema) -> Result<Self, SchemaError> {
        let time = schema.require(Role::Time)?;
        let columns = DISPLAY_COLUMNS
            .into_iter()
            .filter_map(|role| schema.index_of(role).map(|i| (role, i)))
            .collect();
        let metrics = schema
            .index_of(Role::AverageError)
            .zip(schema.index_of(Role::InputVariance));
        Ok(Self {
            time,
            columns,
            metrics,
            score: schema.index_of(Role::Score),
        })
    }
}

/// Rastreador da sessão. Um por conexão; alimentado por um único produtor.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    schema: Schema,
    index: FieldIndex,
    config: SessionConfig,
    ranks: RankTable,
    state: SessionState,
    stats: SessionStats,
}

impl SessionTracker {
    /// Falha se o esquema não tiver o campo `time`.
    pub fn new(schema: Schema, config: SessionConfig, ranks: RankTable) -> Result<Self, SchemaError> {
        let index = FieldIndex::resolve(&schema)?;
        Ok(Self {
            schema,
            index,
            config,
            ranks,
            state: SessionState::default(),
            stats: SessionStats::default(),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn rank(&self, score: f32) -> &str {
        self.ranks.rank(score)
    }

    /// Aplica o resultado do parse da próxima linha.
    pub fn apply(&mut self, outcome: ParseOutcome) -> Vec<Effect> {
        if self.state.fatal {
            debug!("Sessão encerrada, ignorando entrada");
            return Vec::new();
        }

        match outcome {
            Ok(frame) => self.accept(frame),
            Err(RejectReason::EmergencyMessage(text)) => self.emergency(text),
            Err(reason) => self.reject(reason),
        }
    }

    /// Registra a desconexão do dispositivo. Idempotente.
    pub fn apply_disconnect(&mut self) -> Vec<Effect> {
        if self.state.fatal {
            return Vec::new();
        }
        self.state.fatal = true;
        warn!(
            "Dispositivo desconectado ({} frames aceitos, {} rejeitados)",
            self.stats.accepted, self.stats.rejected
        );
        vec![Effect::FatalDisconnect]
    }

    fn accept(&mut self, frame: Frame) -> Vec<Effect> {
        let mut effects = Vec::new();

        if frame.len() != self.schema.field_count() {
            // Frame de outro esquema; o parser nunca produz isso
            let reason = RejectReason::FieldCountMismatch {
                expected: self.schema.field_count(),
                found: frame.len(),
            };
            return self.reject(reason);
        }

        if !self.state.validated {
            self.state.validated = true;
            info!("Primeiro frame válido: protocolo confirmado");
            effects.push(Effect::EnableInput);
            effects.push(Effect::ClearEmergency);
        }

        let time = self.value(&frame, self.index.time);
        if let Some(prev) = self.state.last_frame.as_ref().map(|f| self.value(f, self.index.time)) {
            if time < prev {
                warn!("Tempo regrediu: {time} após {prev}");
            }
        }

        effects.push(Effect::Display(self.display_row(&frame, time)));
        effects.push(Effect::Persist(PersistRecord {
            values: frame.values().to_vec(),
        }));

        self.stats.accepted += 1;
        self.state.last_frame = Some(frame);
        effects
    }

    fn reject(&mut self, reason: RejectReason) -> Vec<Effect> {
        self.stats.rejected += 1;
        debug!("Linha descartada: {reason}");

        let mut effects = vec![Effect::ParseError(reason)];
        if !self.state.validated {
            effects.push(Effect::IncompatibleFirmware);
        }
        effects
    }

    fn emergency(&mut self, text: String) -> Vec<Effect> {
        self.stats.emergencies += 1;

        let overheat = !self.config.overheat_marker.is_empty()
            && text
                .to_lowercase()
                .contains(&self.config.overheat_marker.to_lowercase());

        let mut effects = vec![Effect::Emergency(text)];
        if overheat {
            warn!("Superaquecimento reportado pelo dispositivo");
            let final_score = self.last_score();
            effects.push(Effect::Alarm);
            effects.push(Effect::FinalScore(final_score));
        }
        effects
    }

    fn display_row(&self, frame: &Frame, time: f32) -> DisplayRow {
        let columns = self
            .index
            .columns
            .iter()
            .map(|&(role, i)| (role, self.value(frame, i)))
            .collect();

        let metrics = match self.index.metrics {
            Some((avg, var)) if time > self.config.metrics_after => Some(Metrics {
                average_error: self.value(frame, avg),
                input_variance: self.value(frame, var),
            }),
            _ => None,
        };

        let score = if time > self.config.score_after {
            self.score_of(frame)
        } else {
            None
        };

        DisplayRow {
            time,
            columns,
            metrics,
            score,
        }
    }

    fn score_of(&self, frame: &Frame) -> Option<ScoreReading> {
        let score = frame.get(self.index.score?)?;
        Some(ScoreReading {
            score,
            rank: self.ranks.rank(score).to_string(),
        })
    }

    fn last_score(&self) -> Option<ScoreReading> {
        self.state
            .last_frame
            .as_ref()
            .and_then(|f| self.score_of(f))
    }

    fn value(&self, frame: &Frame, index: usize) -> f32 {
        frame.get(index).unwrap_or(f32::NAN)
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::parse;
    use crate::schema::SchemaRevision;

    fn tracker(rev: SchemaRevision) -> SessionTracker {
        SessionTracker::new(rev.schema(), SessionConfig::default(), RankTable::standard()).unwrap()
    }

    /// Frame V3 com tempo e pontuação dados.
    fn v3_frame(time: f32, score: f32) -> Frame {
        Frame::new(vec![55.0, 60.0, 0.0, 58.0, 57.5, time, 0.4, 1.5, score])
    }

    fn count(effects: &[Effect], pred: impl Fn(&Effect) -> bool) -> usize {
        effects.iter().filter(|e| pred(*e)).count()
    }

    fn display(effects: &[Effect]) -> &DisplayRow {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::Display(row) => Some(row),
                _ => None,
            })
            .expect("sem linha de exibição")
    }

    #[test]
    fn validation_is_monotonic() {
        let mut t = tracker(SchemaRevision::V3);
        let mismatch = Err(RejectReason::FieldCountMismatch {
            expected: 9,
            found: 2,
        });

        let e1 = t.apply(mismatch);
        assert!(!t.state().validated);
        assert!(e1.contains(&Effect::IncompatibleFirmware));

        let e2 = t.apply(Ok(v3_frame(1.0, 0.0)));
        assert!(t.state().validated);
        assert_eq!(count(&e2, |e| *e == Effect::EnableInput), 1);
        assert_eq!(count(&e2, |e| *e == Effect::ClearEmergency), 1);

        let e3 = t.apply(Ok(v3_frame(2.0, 0.0)));
        assert!(t.state().validated);
        assert_eq!(count(&e3, |e| *e == Effect::EnableInput), 0);
        assert_eq!(t.stats().accepted, 2);
        assert_eq!(t.stats().rejected, 1);
    }

    #[test]
    fn accepted_frame_emits_display_and_persist() {
        let mut t = tracker(SchemaRevision::V3);
        let effects = t.apply(Ok(v3_frame(5.0, 12.0)));

        let row = display(&effects);
        assert_eq!(row.time, 5.0);
        assert_eq!(
            row.columns,
            vec![
                (Role::Time, 5.0),
                (Role::PercentOn, 55.0),
                (Role::Temperature, 58.0),
                (Role::TemperatureFiltered, 57.5),
                (Role::SetPoint, 60.0),
                (Role::FanSpeed, 0.0),
            ]
        );
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Persist(rec) if rec.values.len() == 9
        )));
        assert_eq!(t.state().last_frame, Some(v3_frame(5.0, 12.0)));
    }

    #[test]
    fn metrics_and_score_are_time_gated() {
        let mut t = tracker(SchemaRevision::V3);

        let early = t.apply(Ok(v3_frame(18.0, 12.0)));
        assert_eq!(display(&early).metrics, None);
        assert_eq!(display(&early).score, None);

        let mid = t.apply(Ok(v3_frame(18.5, 12.0)));
        assert_eq!(
            display(&mid).metrics,
            Some(Metrics {
                average_error: 1.5,
                input_variance: 0.4
            })
        );
        assert_eq!(display(&mid).score, None);

        let late = t.apply(Ok(v3_frame(29.5, 13.0)));
        assert_eq!(
            display(&late).score,
            Some(ScoreReading {
                score: 13.0,
                rank: "Control Master".into()
            })
        );
    }

    #[test]
    fn schema_without_metrics_never_shows_them() {
        let mut t = tracker(SchemaRevision::V1);
        let effects = t.apply(Ok(Frame::new(vec![40.0, 50.0, 45.0, 44.5, 35.0])));
        let row = display(&effects);
        assert_eq!(row.time, 35.0);
        assert_eq!(row.metrics, None);
        assert_eq!(row.score, None);
        assert_eq!(row.columns.len(), 5);
    }

    #[test]
    fn parse_errors_warn_only_before_validation() {
        let mut t = tracker(SchemaRevision::V3);
        let e1 = t.apply(Err(RejectReason::MalformedBrackets));
        assert_eq!(
            e1,
            vec![
                Effect::ParseError(RejectReason::MalformedBrackets),
                Effect::IncompatibleFirmware
            ]
        );

        t.apply(Ok(v3_frame(1.0, 0.0)));
        let e2 = t.apply(Err(RejectReason::MalformedBrackets));
        assert_eq!(e2, vec![Effect::ParseError(RejectReason::MalformedBrackets)]);
        assert!(t.state().validated);
    }

    #[test]
    fn emergency_without_overheat() {
        let mut t = tracker(SchemaRevision::V3);
        let effects = t.apply(Err(RejectReason::EmergencyMessage("!Sensor fault".into())));
        assert_eq!(effects, vec![Effect::Emergency("!Sensor fault".into())]);
        assert!(!t.state().validated);
        assert_eq!(t.stats().emergencies, 1);
    }

    #[test]
    fn overheat_raises_alarm_and_final_score() {
        let mut t = tracker(SchemaRevision::V3);
        t.apply(Ok(v3_frame(10.0, 17.0)));

        let effects = t.apply(Err(RejectReason::EmergencyMessage("!OVERHEAT!".into())));
        assert_eq!(
            effects,
            vec![
                Effect::Emergency("!OVERHEAT!".into()),
                Effect::Alarm,
                Effect::FinalScore(Some(ScoreReading {
                    score: 17.0,
                    rank: "Learner".into()
                })),
            ]
        );
    }

    #[test]
    fn overheat_before_any_frame_has_no_score() {
        let mut t = tracker(SchemaRevision::V3);
        let effects = t.apply(Err(RejectReason::EmergencyMessage("overheat!".into())));
        assert!(effects.contains(&Effect::FinalScore(None)));
    }

    #[test]
    fn disconnect_is_terminal_and_idempotent() {
        let mut t = tracker(SchemaRevision::V3);
        t.apply(Ok(v3_frame(1.0, 0.0)));

        assert_eq!(t.apply_disconnect(), vec![Effect::FatalDisconnect]);
        let snapshot = t.state().clone();
        let stats = *t.stats();

        assert!(t.apply(Ok(v3_frame(2.0, 0.0))).is_empty());
        assert!(t.apply(Err(RejectReason::MalformedBrackets)).is_empty());
        assert!(t.apply(Err(RejectReason::EmergencyMessage("!overheat".into()))).is_empty());
        assert!(t.apply_disconnect().is_empty());

        assert_eq!(t.state(), &snapshot);
        assert_eq!(t.stats(), &stats);
        assert!(t.state().fatal);
    }

    #[test]
    fn requires_time_role() {
        let schema = Schema::new(vec![Role::Temperature, Role::Score]).unwrap();
        let result = SessionTracker::new(schema, SessionConfig::default(), RankTable::standard());
        assert!(matches!(result, Err(SchemaError::MissingRole(Role::Time))));
    }

    #[test]
    fn wrong_width_frame_is_rejected() {
        let mut t = tracker(SchemaRevision::V3);
        let effects = t.apply(Ok(Frame::new(vec![1.0, 2.0])));
        assert!(matches!(
            effects[0],
            Effect::ParseError(RejectReason::FieldCountMismatch { found: 2, .. })
        ));
        assert!(!t.state().validated);
    }

    #[test]
    fn parser_and_tracker_pipeline() {
        let schema = SchemaRevision::V3.schema();
        let mut t = tracker(SchemaRevision::V3);
        let lines = [
            "[1,2]",
            "[55,60,0,58,57.5,30.0,0.4,1.5,nan]",
            "[55,60,0,58,57.5,31.0,0.4,1.5,19.5]",
        ];

        let mut all = Vec::new();
        for line in lines {
            all.push(t.apply(parse(line, &schema)));
        }

        assert!(all[0].contains(&Effect::IncompatibleFirmware));

        // NaN na pontuação cai na última faixa
        let nan_score = display(&all[1]).score.clone().unwrap();
        assert!(nan_score.score.is_nan());
        assert_eq!(nan_score.rank, "Crash Test Dummy");

        assert_eq!(display(&all[2]).score.as_ref().unwrap().rank, "Learner");
    }

    #[test]
    fn persist_line_uses_two_decimals() {
        let rec = PersistRecord {
            values: vec![1.0, 2.345, -0.5, f32::NAN],
        };
        assert_eq!(rec.to_line(), "1.00,2.35,-0.50,NaN");
    }
}
