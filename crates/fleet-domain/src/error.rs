use thiserror::Error;

/// Errores del dominio (identidades y estados).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Error de validación: {0}")]
    ValidationError(String),

    #[error("Estado desconocido: '{0}'")]
    UnknownState(String),
}

/// Fallo estructural al interpretar los bytes de un reporte.
///
/// Un `ParseError` aborta la ingesta sin efectos secundarios: nada llega a
/// disco ni a la base de datos.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Documento ilegible: {0}")]
    Syntax(String),

    #[error("Campo requerido ausente: {0}")]
    MissingField(&'static str),

    #[error("Campo '{field}' inválido: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_variant_format() {
        let err = DomainError::ValidationError("fqdn vacío".into());
        assert_eq!(err.to_string(), "Error de validación: fqdn vacío");
    }

    #[test]
    fn test_domain_error_is_transparent_inside_parse_error() {
        let err: ParseError = DomainError::UnknownState("skipped".into()).into();
        assert_eq!(err.to_string(), "Estado desconocido: 'skipped'");
    }
}
