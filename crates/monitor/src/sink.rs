//! Consumidor dos efeitos da sessão: console, registros persistidos e alarmes.

use std::io::{self, Write};
use thermolab_core::schema::Schema;
use thermolab_core::session::{DisplayRow, Effect};
use tracing::{debug, error, info, warn};

/// Aplica efeitos em um destino de exibição e, opcionalmente, de persistência.
pub struct EffectSink<O: Write, P: Write> {
    out: O,
    persist: Option<P>,
    alarms: u32,
    fatal: bool,
}

impl<O: Write, P: Write> EffectSink<O, P> {
    /// Cria o sink. O cabeçalho com os nomes dos campos é gravado na persistência.
    pub fn new(out: O, mut persist: Option<P>, schema: &Schema) -> io::Result<Self> {
        if let Some(p) = persist.as_mut() {
            writeln!(p, "{}", schema.field_names().join(","))?;
            p.flush()?;
        }
        Ok(Self {
            out,
            persist,
            alarms: 0,
            fatal: false,
        })
    }

    pub fn alarms(&self) -> u32 {
        self.alarms
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn handle(&mut self, effect: &Effect) -> io::Result<()> {
        match effect {
            Effect::EnableInput => {
                info!("Conexão válida: comando de percentual habilitado");
            }
            Effect::ClearEmergency => {
                debug!("Mensagem de emergência limpa");
            }
            Effect::Display(row) => {
                writeln!(self.out, "{}", format_row(row))?;
            }
            Effect::Persist(record) => {
                if let Some(p) = self.persist.as_mut() {
                    writeln!(p, "{}", record.to_line())?;
                    // Flush por linha: o log sobrevive a um crash
                    p.flush()?;
                }
            }
            Effect::ParseError(reason) => {
                warn!("Erro de parse: {reason}");
            }
            Effect::IncompatibleFirmware => {
                warn!("Possível programa incorreto carregado no dispositivo");
            }
            Effect::Emergency(text) => {
                error!("EMERGÊNCIA: {text}");
                writeln!(self.out, "!! {text}")?;
            }
            Effect::Alarm => {
                self.alarms += 1;
                writeln!(self.out, "\u{7}*** ALARME ***")?;
            }
            Effect::FinalScore(Some(reading)) => {
                writeln!(
                    self.out,
                    "Pontuação final: {:.2} ({})",
                    reading.score, reading.rank
                )?;
            }
            Effect::FinalScore(None) => {
                writeln!(self.out, "Pontuação final indisponível")?;
            }
            Effect::FatalDisconnect => {
                self.fatal = true;
                error!("Erro fatal: dispositivo desconectado. Reinicie a sessão para continuar.");
            }
        }
        self.out.flush()
    }
}

/// Formata uma linha da tabela para o console.
pub fn format_row(row: &DisplayRow) -> String {
    let mut parts: Vec<String> = row
        .columns
        .iter()
        .map(|(role, value)| format!("{}: {value:.2}", role.label()))
        .collect();

    if let Some(m) = &row.metrics {
        parts.push(format!("Average Error: {:.2}", m.average_error));
        parts.push(format!("Input Variance: {:.2}", m.input_variance));
    }
    if let Some(s) = &row.score {
        parts.push(format!("Score: {:.2} [{}]", s.score, s.rank));
    }

    parts.join(" | ")
}
