use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrigadeError {
    #[error("not initialized: run 'brigade init'")]
    NotInitialized,

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("scenario template not found: {0}")]
    TemplateNotFound(String),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("invalid phase: {0}")]
    InvalidPhase(String),

    #[error("unknown station: {0}")]
    UnknownStation(String),

    #[error("station '{0}' is at capacity")]
    StationFull(String),

    #[error("equipment '{equipment}' not found at station '{station}'")]
    UnknownEquipment { station: String, equipment: String },

    #[error("equipment '{equipment}' unavailable: {reason}")]
    EquipmentUnavailable { equipment: String, reason: String },

    #[error("ingredient '{0}' is out of stock")]
    IngredientUnavailable(String),

    #[error("recipe not found: {0}")]
    RecipeNotFound(String),

    #[error("no actors available for scenario '{0}'")]
    NoActors(String),

    #[error("run store error: {0}")]
    RunStore(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BrigadeError>;
