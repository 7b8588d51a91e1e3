//! The analysis prompt sent to the LLM.
//!
//! The template is constant for the process lifetime and has exactly one
//! interpolation point, [`DOCUMENT_PLACEHOLDER`], where the extracted text is
//! inserted verbatim. No escaping or truncation is applied: very large
//! documents are embedded as-is and the provider decides what to do with them.
//!
//! Callers can override the default via
//! [`crate::config::AnalyzerConfig::prompt_template`].

/// Marker replaced by the extracted document text.
pub const DOCUMENT_PLACEHOLDER: &str = "{document}";

/// Questions the model must answer about every pliego, in display order.
pub const ANALYSIS_QUESTIONS: &[&str] = &[
    "Nombre",
    "Expediente",
    "Organismo contratante",
    "Objeto del contrato (resumen de no más de 100 palabras)",
    "Tecnologías del proyecto",
    "Duración. ¿Incluye prórroga?",
    "Ubicación de los trabajos. ¿Permite teletrabajo?",
    "¿Permite subcontratación?",
    "Equipo solicitado",
    "¿Pide alguna certificación o titulación mínima en los perfiles? ¿Cuáles?",
    "¿Es necesario presentar los CVs del equipo en la fase de oferta?",
    "¿Cuáles son los criterios de valoración y qué peso tiene cada uno de ellos?",
    "¿Qué tipo de fórmula de precio se usa?",
    "Importe de licitación",
    "¿Cómo debe presentarse la oferta técnica? ¿Qué apartados tiene que tener? ¿Tiene alguna limitación de hojas o formato?",
    "¿Puedes sugerir un esquema para la estructura de la oferta?",
];

/// Default prompt template. The bullet list mirrors [`ANALYSIS_QUESTIONS`].
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Eres un analista inteligente de pliegos de proyectos de tecnología para la empresa Anhela IT.
Vas a recibir el texto del pliego de un proyecto. Tu objetivo es analizarlo minuciosamente para responder de manera completa y concisa a estas preguntas:
•\tNombre
•\tExpediente
•\tOrganismo contratante
•\tObjeto del contrato (resumen de no más de 100 palabras)
•\tTecnologías del proyecto
•\tDuración. ¿Incluye prórroga?
•\tUbicación de los trabajos. ¿Permite teletrabajo?
•\t¿Permite subcontratación?
•\tEquipo solicitado
•\t¿Pide alguna certificación o titulación mínima en los perfiles? ¿Cuáles?
•\t¿Es necesario presentar los CVs del equipo en la fase de oferta?
•\t¿Cuáles son los criterios de valoración y qué peso tiene cada uno de ellos?
•\t¿Qué tipo de fórmula de precio se usa?
•\tImporte de licitación
•\t¿Cómo debe presentarse la oferta técnica? ¿Qué apartados tiene que tener? ¿Tiene alguna limitación de hojas o formato?
•\t¿Puedes sugerir un esquema para la estructura de la oferta?
- Debes extraer el email y teléfono de contacto.

Por favor, responde de manera organizada y bien estructurada.

Si lo haces bien serás recompensado.

Aquí tienes el texto del pliego que debes analizar:
{document}
";

/// Build the full prompt for `document_text` using the default template.
pub fn build_analysis_prompt(document_text: &str) -> String {
    render_template(DEFAULT_PROMPT_TEMPLATE, document_text)
}

/// Substitute `document_text` into `template`.
///
/// Only the first placeholder is replaced, and the inserted text is never
/// rescanned, so a document that itself contains `{document}` is embedded
/// unchanged.
pub fn render_template(template: &str, document_text: &str) -> String {
    template.replacen(DOCUMENT_PLACEHOLDER, document_text, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_has_single_placeholder() {
        assert_eq!(DEFAULT_PROMPT_TEMPLATE.matches(DOCUMENT_PLACEHOLDER).count(), 1);
    }

    #[test]
    fn prompt_lists_every_question_verbatim() {
        let prompt = build_analysis_prompt("texto");
        for q in ANALYSIS_QUESTIONS {
            assert!(prompt.contains(&format!("•\t{q}\n")), "missing question: {q}");
        }
        assert!(prompt.contains("email y teléfono de contacto"));
    }

    #[test]
    fn preamble_and_closing_lines_kept() {
        let prompt = build_analysis_prompt("texto");
        assert!(prompt.starts_with(
            "Eres un analista inteligente de pliegos de proyectos de tecnología para la empresa Anhela IT.\n"
        ));
        assert!(prompt.contains("\nSi lo haces bien serás recompensado.\n"));
        let closing = prompt.find("recompensado").unwrap();
        let document = prompt.find("Aquí tienes el texto del pliego").unwrap();
        assert!(closing < document);
    }

    #[test]
    fn prompt_embeds_full_text_contiguously() {
        let text = "Página 1\n\n".repeat(20_000) + "IMPORTE: 1.000.000 €";
        let prompt = build_analysis_prompt(&text);
        assert!(prompt.contains(&text));
        assert!(prompt.len() > text.len());
    }

    #[test]
    fn hostile_text_is_not_reinterpreted() {
        let text = "{document} \"quotes\" <b>tags</b> {} %s \\n";
        let prompt = build_analysis_prompt(text);
        assert!(prompt.contains(text));
        // Template text after the placeholder is empty apart from the newline.
        assert!(prompt.ends_with(&format!("{text}\n")));
    }

    #[test]
    fn empty_text_still_yields_questions() {
        let prompt = build_analysis_prompt("");
        assert!(prompt.contains("Importe de licitación"));
        assert!(!prompt.contains(DOCUMENT_PLACEHOLDER));
    }

    #[test]
    fn custom_template() {
        let out = render_template("Resume:\n{document}\nFin", "abc");
        assert_eq!(out, "Resume:\nabc\nFin");
    }
}
