//! Prompt builder for the virtual patient.
//!
//! Assembles the hidden instruction that seeds every chat context: the
//! instructor role, the clinical topic, the presentation rule, the grading
//! rule with the `CALIFICACIÓN:` marker, and (optionally) a bounded excerpt of
//! the user's reference document.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::score::SCORE_MARKER;

/// Fixed user turn that asks the model to open the case.
pub const CASE_TRIGGER: &str = "Empieza la simulación ahora.";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PromptError {
    #[error("topic must not be empty")]
    EmptyTopic,
}

/// Clinical area a random case is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Specialty {
    #[default]
    MedicinaInterna,
    Urgencias,
    Cardiologia,
    Neurologia,
}

impl Specialty {
    pub fn label(self) -> &'static str {
        match self {
            Specialty::MedicinaInterna => "Medicina Interna",
            Specialty::Urgencias => "Urgencias",
            Specialty::Cardiologia => "Cardiología",
            Specialty::Neurologia => "Neurología",
        }
    }
}

impl fmt::Display for Specialty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Simulator level the model should play at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    #[default]
    Estudiante,
    Residente,
    Especialista,
}

impl Difficulty {
    pub fn label(self) -> &'static str {
        match self {
            Difficulty::Estudiante => "Estudiante",
            Difficulty::Residente => "Residente",
            Difficulty::Especialista => "Especialista",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Validated case parameters. The topic is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseSetup {
    topic: String,
    difficulty: Difficulty,
}

impl CaseSetup {
    /// Use an explicit topic. Blank topics are rejected.
    pub fn new(topic: impl Into<String>, difficulty: Difficulty) -> Result<Self, PromptError> {
        let topic = topic.into().trim().to_string();
        if topic.is_empty() {
            return Err(PromptError::EmptyTopic);
        }
        Ok(Self { topic, difficulty })
    }

    /// Free-text topic if given, otherwise a random case from `area`.
    /// Fails only when neither yields a topic.
    pub fn resolve(
        free_topic: Option<&str>,
        area: Option<Specialty>,
        difficulty: Difficulty,
    ) -> Result<Self, PromptError> {
        match (free_topic.map(str::trim).filter(|t| !t.is_empty()), area) {
            (Some(topic), _) => Self::new(topic, difficulty),
            (None, Some(area)) => Self::new(format!("Caso aleatorio de {}", area), difficulty),
            (None, None) => Err(PromptError::EmptyTopic),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }
}

/// Cut `text` to at most `max_chars` characters, on a char boundary.
///
/// Idempotent: truncating an already truncated text returns it unchanged.
pub fn truncate_reference(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Build the hidden system instruction for a case.
pub fn build_system_prompt(
    setup: &CaseSetup,
    reference_text: Option<&str>,
    max_reference_chars: usize,
) -> String {
    let mut prompt = format!(
        "Eres un instructor clínico estricto que dirige un Simulador de Casos Clínicos nivel {level}.\n\
         Genera un caso de {topic}.\n\
         1. Empieza SOLO con el Motivo de Consulta y Signos Vitales.\n\
         2. NO des diagnósticos ni expliques nada aún.\n\
         3. Adopta la personalidad del paciente (responde corto si le duele, o ansioso).\n\
         4. Espera preguntas del doctor.\n\
         5. CRÍTICO: Cuando el usuario declare su diagnóstico final o tratamiento \
         (por ejemplo \"DIAGNÓSTICO FINAL: [su diagnóstico]\"), evalúa su desempeño de 0 a 100. \
         Tu respuesta DEBE comenzar exactamente con \"{marker} <número entero>/100\" \
         seguido de una justificación detallada basada en guías clínicas.\n",
        level = setup.difficulty(),
        topic = setup.topic(),
        marker = SCORE_MARKER,
    );

    if let Some(reference) = reference_text.filter(|r| !r.trim().is_empty()) {
        let excerpt = truncate_reference(reference, max_reference_chars);
        prompt.push_str(
            "\nDOCUMENTO DE REFERENCIA:\n\
             Evalúa al usuario ESTRICTAMENTE según el siguiente texto de referencia. \
             En tu justificación cita textualmente los fragmentos del documento que \
             respaldan la calificación.\n\
             --- INICIO DEL DOCUMENTO ---\n",
        );
        prompt.push_str(excerpt);
        prompt.push_str("\n--- FIN DEL DOCUMENTO ---\n");
    }

    prompt
}
