use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cannot open simulation file `{}`", .path.display())]
    OpenFile {
        path: PathBuf,
        #[source]
        source: sfio_format::Error,
    },

    #[error("Cannot select frames `{selection}` of `{}`", .path.display())]
    SelectFrames {
        path: PathBuf,
        selection: String,
        #[source]
        source: sfio_format::Error,
    },

    #[error("Cannot find section `{name}` in `{}`", .path.display())]
    FindSection {
        path: PathBuf,
        name: String,
        #[source]
        source: sfio_format::Error,
    },

    #[error("Cannot read section `{name}` of `{}`", .path.display())]
    ReadSection {
        path: PathBuf,
        name: String,
        #[source]
        source: sfio_format::Error,
    },

    #[error("Cannot convert box input `{input}`")]
    BoxInput {
        input: String,
        #[source]
        source: sfio_format::Error,
    },

    #[error("Cannot encode section as JSON")]
    Json {
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot write to standard output")]
    Stdout {
        #[source]
        source: std::io::Error,
    },
}
