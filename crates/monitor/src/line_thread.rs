//! Thread de leitura que consome o fluxo serial e envia linhas para a sessão via channel.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::io::{BufRead, ErrorKind, Read};
use thermolab_core::protocol::EMERGENCY_MARKER;
use tracing::{debug, info, warn};

const EMERGENCY_BYTE: u8 = EMERGENCY_MARKER as u8;

/// Linhas maiores que isso são descartadas (dispositivo mandando lixo sem '\n').
pub const MAX_LINE_BYTES: usize = 4096;

/// Mensagem enviada da thread de leitura para a sessão.
#[derive(Debug, Clone, PartialEq)]
pub enum LineMessage {
    Line { text: String, raw_size: usize },
    /// Linha acima de [`MAX_LINE_BYTES`]. Só os primeiros bytes são guardados;
    /// o resto é descartado até o próximo '\n' e nunca vira uma nova linha.
    Oversized {
        head: String,
        /// A linha inteira (não só `head`) contém o marcador de emergência
        emergency: bool,
        raw_size: usize,
    },
    /// Fim do fluxo ou erro de I/O. Sempre a última mensagem.
    Disconnected { reason: String },
}

/// Inicia a thread de leitura. Retorna o receiver do channel.
pub fn spawn_reader_thread<R>(
    source: R,
    source_name: String,
    capacity: usize,
) -> std::io::Result<Receiver<LineMessage>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = bounded::<LineMessage>(capacity.max(1));

    std::thread::Builder::new()
        .name("line-reader".into())
        .spawn(move || {
            reader_loop(source, &source_name, &tx);
        })?;

    Ok(rx)
}

fn reader_loop<R: BufRead>(mut source: R, source_name: &str, tx: &Sender<LineMessage>) {
    info!("Lendo linhas de {source_name}");

    let mut buf = Vec::with_capacity(256);
    let reason = loop {
        buf.clear();
        match source
            .by_ref()
            .take(MAX_LINE_BYTES as u64)
            .read_until(b'\n', &mut buf)
        {
            Ok(0) => break "fim do fluxo".to_string(),
            Ok(size) => {
                let oversized = size == MAX_LINE_BYTES && buf.last() != Some(&b'\n');
                let decoded = String::from_utf8_lossy(&buf);
                let text = decoded.trim_end_matches(['\r', '\n']).to_string();

                // Linhas vazias seguem para o parser (viram MalformedBrackets)
                let msg = if oversized {
                    match discard_rest_of_line(&mut source) {
                        Ok((skipped, marker_in_tail)) => {
                            warn!(
                                "Linha com {} bytes (limite {MAX_LINE_BYTES}), descartando o resto",
                                size + skipped
                            );
                            LineMessage::Oversized {
                                emergency: marker_in_tail || buf.contains(&EMERGENCY_BYTE),
                                head: text,
                                raw_size: size + skipped,
                            }
                        }
                        Err(e) => {
                            warn!("Erro ao ler {source_name}: {e}");
                            break e.to_string();
                        }
                    }
                } else {
                    LineMessage::Line {
                        text,
                        raw_size: size,
                    }
                };

                // Envio bloqueante: a sessão depende da ordem, nada pode ser descartado
                if tx.send(msg).is_err() {
                    debug!("Sessão encerrada, parando leitura");
                    return;
                }
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                warn!("Erro ao ler {source_name}: {e}");
                break e.to_string();
            }
        }
    };

    let _ = tx.send(LineMessage::Disconnected { reason });
}

/// Consome bytes até o próximo '\n' (inclusive) ou o fim do fluxo.
///
/// Retorna quantos bytes foram descartados e se o marcador de emergência
/// apareceu entre eles.
fn discard_rest_of_line<R: BufRead>(source: &mut R) -> std::io::Result<(usize, bool)> {
    let mut skipped = 0;
    let mut marker = false;
    loop {
        let chunk = match source.fill_buf() {
            Ok(chunk) => chunk,
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if chunk.is_empty() {
            return Ok((skipped, marker));
        }

        let (used, done) = match chunk.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (chunk.len(), false),
        };
        marker |= chunk[..used].contains(&EMERGENCY_BYTE);
        source.consume(used);
        skipped += used;

        if done {
            return Ok((skipped, marker));
        }
    }
}
