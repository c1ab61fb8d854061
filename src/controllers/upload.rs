use axum::body::Bytes;
use axum::extract::Multipart;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use crate::core::error::Error;

pub(crate) const URL_PREFIX: &str = "/uploads";

pub(crate) const AVATAR_LIMIT: usize = 2 * 1024 * 1024;
pub(crate) const PRODUCT_IMAGE_LIMIT: usize = 5 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Folder {
    Avatars,
    Products,
}

impl Folder {
    fn as_str(&self) -> &'static str {
        match self {
            Folder::Avatars => "avatars",
            Folder::Products => "products",
        }
    }

    pub(crate) fn limit(&self) -> usize {
        match self {
            Folder::Avatars => AVATAR_LIMIT,
            Folder::Products => PRODUCT_IMAGE_LIMIT,
        }
    }
}

/// One file pulled out of a multipart body.
#[derive(Debug)]
pub(crate) struct ImageUpload {
    pub(crate) file_name: Option<String>,
    pub(crate) content_type: Option<String>,
    pub(crate) bytes: Bytes,
}

impl ImageUpload {
    /// Takes the first field called `name`; other fields are drained and ignored.
    pub(crate) async fn from_multipart(
        multipart: &mut Multipart,
        name: &str,
    ) -> Result<Self, Error> {
        while let Some(field) = multipart.next_field().await? {
            if field.name() != Some(name) {
                continue;
            }

            let file_name = field.file_name().map(str::to_owned);
            let content_type = field.content_type().map(str::to_owned);
            let bytes = field.bytes().await?;

            if bytes.is_empty() {
                break;
            }

            return Ok(Self {
                file_name,
                content_type,
                bytes,
            });
        }

        Err(Error::MissingFile)
    }

    fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|content_type| content_type.starts_with("image/"))
    }

    fn extension(&self) -> String {
        self.file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty() && ext.len() <= 8)
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| "bin".into())
    }
}

/// Writes uploads below a single root directory, which is also what
/// `/uploads` serves statically.
#[derive(Clone, Debug)]
pub(crate) struct UploadController {
    root: PathBuf,
}

impl UploadController {
    pub(crate) fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    /// Stores the image and returns its public path, e.g.
    /// `/uploads/products/<uuid>.png`.
    pub(crate) async fn save(&self, folder: Folder, upload: ImageUpload) -> Result<String, Error> {
        if !upload.is_image() {
            return Err(Error::UnsupportedFileType);
        }

        if upload.bytes.len() > folder.limit() {
            return Err(Error::FileTooLarge(folder.limit()));
        }

        let file_name = format!("{}.{}", Uuid::new_v4(), upload.extension());
        let directory = self.root.join(folder.as_str());

        tokio::fs::create_dir_all(&directory).await?;
        tokio::fs::write(directory.join(&file_name), &upload.bytes).await?;

        tracing::info!(folder = folder.as_str(), %file_name, size = upload.bytes.len(), "stored upload");

        Ok(format!("{}/{}/{}", URL_PREFIX, folder.as_str(), file_name))
    }

    /// Deletes a previously stored file. Paths that do not point inside the
    /// upload root are refused; a file that is already gone is not an error.
    pub(crate) async fn remove(&self, public_path: &str) -> Result<(), Error> {
        let path = self.resolve(public_path)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::IO(e)),
        }
    }

    /// Best-effort variant used after the database write already succeeded.
    pub(crate) async fn discard(&self, public_path: &str) {
        if let Err(e) = self.remove(public_path).await {
            tracing::warn!(path = public_path, "failed to remove upload: {}", e);
        }
    }

    /// True when `public_path` has exactly the shape [`Self::save`] returns
    /// for `folder`: `/uploads/<folder>/<file>` with a single plain file name.
    pub(crate) fn is_stored(&self, folder: Folder, public_path: &str) -> bool {
        let Some(file_name) = public_path
            .strip_prefix(URL_PREFIX)
            .and_then(|rest| rest.strip_prefix('/'))
            .and_then(|rest| rest.strip_prefix(folder.as_str()))
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            return false;
        };

        let mut components = Path::new(file_name).components();

        !file_name.contains(['/', '\\'])
            && matches!(components.next(), Some(Component::Normal(_)))
            && components.next().is_none()
    }

    fn resolve(&self, public_path: &str) -> Result<PathBuf, Error> {
        let relative = public_path
            .strip_prefix(URL_PREFIX)
            .or_else(|| public_path.strip_prefix("uploads"))
            .unwrap_or(public_path)
            .trim_start_matches('/');

        let relative = Path::new(relative);
        let only_normal = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

        if relative.as_os_str().is_empty() || !only_normal {
            return Err(Error::InvalidPath(public_path.into()));
        }

        Ok(self.root.join(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(file_name: &str, content_type: &str) -> ImageUpload {
        ImageUpload {
            file_name: Some(file_name.into()),
            content_type: Some(content_type.into()),
            bytes: Bytes::from_static(b"\x89PNG fake"),
        }
    }

    #[test]
    fn extension_is_sanitized() {
        assert_eq!(image("photo.JPG", "image/jpeg").extension(), "jpg");
        assert_eq!(image("../../etc/passwd", "image/png").extension(), "bin");
        assert_eq!(image("noext", "image/png").extension(), "bin");
        assert_eq!(image("a.p/ng", "image/png").extension(), "bin");
    }

    #[tokio::test]
    async fn saves_and_removes_images() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadController::new(dir.path().to_path_buf());

        let url = uploads
            .save(Folder::Products, image("desk.png", "image/png"))
            .await
            .unwrap();

        assert!(url.starts_with("/uploads/products/"));
        assert!(url.ends_with(".png"));

        let stored = uploads.resolve(&url).unwrap();
        assert!(stored.exists());

        uploads.remove(&url).await.unwrap();
        assert!(!stored.exists());

        // already gone
        uploads.remove(&url).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadController::new(dir.path().to_path_buf());

        assert!(matches!(
            uploads.save(Folder::Avatars, image("notes.txt", "text/plain")).await,
            Err(Error::UnsupportedFileType)
        ));
    }

    #[tokio::test]
    async fn rejects_oversized_avatars() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadController::new(dir.path().to_path_buf());

        let upload = ImageUpload {
            file_name: Some("huge.png".into()),
            content_type: Some("image/png".into()),
            bytes: Bytes::from(vec![0u8; AVATAR_LIMIT + 1]),
        };

        assert!(matches!(
            uploads.save(Folder::Avatars, upload).await,
            Err(Error::FileTooLarge(AVATAR_LIMIT))
        ));
    }

    #[test]
    fn stored_paths_match_the_folder() {
        let uploads = UploadController::new(PathBuf::from("/srv/uploads"));

        assert!(uploads.is_stored(Folder::Products, "/uploads/products/a1b2.png"));
        assert!(!uploads.is_stored(Folder::Products, "/uploads/avatars/a1b2.png"));
        assert!(!uploads.is_stored(Folder::Products, "/uploads/products/"));
        assert!(!uploads.is_stored(Folder::Products, "/uploads/products/../avatars/a.png"));
        assert!(!uploads.is_stored(Folder::Products, "/uploads/products/nested/a.png"));
        assert!(!uploads.is_stored(Folder::Products, "/uploads/products/.."));
        assert!(!uploads.is_stored(Folder::Products, "uploads/products/a.png"));
        assert!(!uploads.is_stored(Folder::Products, "https://elsewhere.test/a.png"));
        assert!(uploads.is_stored(Folder::Avatars, "/uploads/avatars/me.jpg"));
    }

    #[test]
    fn refuses_paths_outside_the_root() {
        let uploads = UploadController::new(PathBuf::from("/srv/uploads"));

        assert!(uploads.resolve("/uploads/../secret").is_err());
        assert!(uploads.resolve("/uploads/").is_err());
        assert!(
            uploads
                .resolve("/uploads//etc/passwd")
                .unwrap()
                .starts_with("/srv/uploads")
        );
        assert_eq!(
            uploads.resolve("uploads/products/a.png").unwrap(),
            PathBuf::from("/srv/uploads/products/a.png")
        );
    }
}
