pub mod filesystem;
pub mod s3;

pub use filesystem::FilesystemArtifactStore;
pub use s3::S3ArtifactStore;
