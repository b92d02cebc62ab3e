use thiserror::Error;

/// Failure of a single fetch against the upstream feed.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed feed response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Why a single state vector was skipped during decoding.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateVectorError {
    #[error("state vector has {0} slots, expected 17 or 18")]
    Length(usize),

    #[error("slot `{field}` holds unexpected value {value}")]
    FieldType {
        field: &'static str,
        value: serde_json::Value,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurfaceError {
    #[error("source `{0}` already exists")]
    DuplicateSource(String),

    #[error("no such source `{0}`")]
    UnknownSource(String),

    #[error("layer `{0}` already exists")]
    DuplicateLayer(String),

    #[error("layer `{layer}` references missing source `{source_id}`")]
    MissingLayerSource { layer: String, source_id: String },
}

#[derive(Error, Debug)]
pub enum IconError {
    #[error("svg parse error {0}")]
    Svg(#[from] usvg::Error),

    #[error("invalid icon size {0}x{1}")]
    Size(u32, u32),

    #[error("png encode error {0}")]
    Encode(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid bounding box: {0}")]
    Bounds(String),

    #[error("invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },
}
