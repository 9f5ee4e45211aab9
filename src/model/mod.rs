use thiserror::Error;

pub mod gitsplit;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading configuration toml: {0}")]
    IO(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Split #{0} has no target")]
    MissingTarget(usize),
    #[error("Empty url in `{0}`")]
    EmptyUrl(String),
}
