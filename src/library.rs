/// Music library layout
///
/// ```text
/// songs/
/// ├── system/                      skipped
/// ├── Bedtime 5A00834F9AAA/        one album: the directory itself
/// │   ├── 01 Lullaby.mp3
/// │   └── 02 Moon.mp3
/// └── Stories 5500ACB96BBB/        several albums
///     ├── Part 1/
///     ├── Part 2/
///     │   └── .albumindicator      this album is played first
///     └── Part 10/
/// ```
///
/// Every entry under the root must be a directory ending in its 12 character
/// tag. A tag directory holds either only files or only sub-directories.
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{CoreError, Result};
use crate::tag::TagId;

const SYSTEM_DIR: &str = "system";
const ALBUM_INDICATOR_FILE: &str = ".albumindicator";
const TAG_DIR_PATTERN: &str = r"^.*([0-9A-F]{12})$";

/// One playable directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Album {
    pub path: PathBuf,
    pub songs: Vec<PathBuf>,
}

/// Tag to album mapping built by scanning the music root
#[derive(Debug, Clone, Default)]
pub struct MusicLibrary {
    root: PathBuf,
    albums: BTreeMap<TagId, Vec<Album>>,
}

impl MusicLibrary {
    /// Scan `root`, failing on the first layout violation
    pub fn scan(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(layout_error("not a directory", root));
        }
        if !root.join(SYSTEM_DIR).is_dir() {
            return Err(layout_error("missing directory", &root.join(SYSTEM_DIR)));
        }
        tracing::debug!("{}/{} exists", root.display(), SYSTEM_DIR);

        let pattern =
            Regex::new(TAG_DIR_PATTERN).map_err(|e| CoreError::Config(e.to_string()))?;
        let mut albums = BTreeMap::new();

        for (name, path) in read_entries(root)? {
            if !path.is_dir() {
                return Err(layout_error("not a directory", &path));
            }
            if name == SYSTEM_DIR {
                continue;
            }

            let tag = pattern
                .captures(&name)
                .and_then(|captures| captures.get(1))
                .ok_or_else(|| layout_error("naming convention error", &path))?;
            let tag = TagId::new(tag.as_str())?;

            if albums.contains_key(&tag) {
                return Err(CoreError::Config(format!(
                    "tag {} found twice: {}",
                    tag,
                    path.display()
                )));
            }

            let tag_albums = prepare_albums(&path)?;
            tracing::debug!("{}={:?}", tag, tag_albums.iter().map(|a| &a.path).collect::<Vec<_>>());
            albums.insert(tag, tag_albums);
        }

        tracing::info!("music library: {} tags under {}", albums.len(), root.display());
        Ok(Self {
            root: root.to_path_buf(),
            albums,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_albums(albums: BTreeMap<TagId, Vec<Album>>) -> Self {
        Self {
            root: PathBuf::new(),
            albums,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Albums for `tag`, the indicated album first
    pub fn albums(&self, tag: &TagId) -> Option<&[Album]> {
        self.albums.get(tag).map(Vec::as_slice)
    }

    /// Songs of the album played when `tag` is placed
    pub fn songs(&self, tag: &TagId) -> Option<&[PathBuf]> {
        self.albums(tag)
            .and_then(|albums| albums.first())
            .map(|album| album.songs.as_slice())
    }

    pub fn tags(&self) -> impl Iterator<Item = &TagId> {
        self.albums.keys()
    }

    pub fn len(&self) -> usize {
        self.albums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.albums.is_empty()
    }
}

fn prepare_albums(tag_path: &Path) -> Result<Vec<Album>> {
    let entries = read_entries(tag_path)?;
    if entries.is_empty() {
        return Err(layout_error("empty tag directory", tag_path));
    }

    let mut albums = Vec::new();
    let mut indicated = None;
    let mut has_files = false;

    for (_, path) in entries {
        if !path.is_dir() {
            has_files = true;
            continue;
        }

        let contents = read_entries(&path)?;
        if contents.is_empty() {
            return Err(layout_error("empty album directory", &path));
        }
        if contents.iter().any(|(name, _)| name == ALBUM_INDICATOR_FILE) {
            indicated = Some(albums.len());
        }
        albums.push(album(path, contents));
    }

    if albums.is_empty() {
        return Ok(vec![album(tag_path.to_path_buf(), read_entries(tag_path)?)]);
    }
    if has_files {
        return Err(layout_error("directory and files mixed", tag_path));
    }

    // Rotate rather than move so the remaining albums keep their order
    if let Some(first) = indicated {
        albums.rotate_left(first);
    }
    Ok(albums)
}

fn album(path: PathBuf, entries: Vec<(String, PathBuf)>) -> Album {
    let songs = entries
        .into_iter()
        .filter(|(name, path)| !name.starts_with('.') && path.is_file())
        .map(|(_, path)| path)
        .collect();
    Album { path, songs }
}

/// Directory entries as `(name, path)`, in natural order
fn read_entries(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let reader = fs::read_dir(dir).map_err(|e| CoreError::io("reading music library", e))?;

    let mut entries = Vec::new();
    for entry in reader {
        let entry = entry.map_err(|e| CoreError::io("reading music library", e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        entries.push((name, entry.path()));
    }

    entries.sort_by(|(a, _), (b, _)| natural_cmp(a, b));
    Ok(entries)
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Chunk {
    Number(u64),
    Text(String),
}

fn chunks(name: &str) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut rest = name;

    while let Some(first) = rest.chars().next() {
        let digits = first.is_ascii_digit();
        let end = rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(rest.len());
        let (chunk, tail) = rest.split_at(end);

        chunks.push(match chunk.parse() {
            Ok(number) if digits => Chunk::Number(number),
            _ => Chunk::Text(chunk.to_lowercase()),
        });
        rest = tail;
    }
    chunks
}

/// "Part 2" sorts before "Part 10"
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    chunks(a).cmp(&chunks(b)).then_with(|| a.cmp(b))
}

fn layout_error(what: &str, path: &Path) -> CoreError {
    CoreError::Config(format!("{}: {}", what, path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    struct Fixture(PathBuf);

    impl Fixture {
        fn new(name: &str) -> Self {
            let root = std::env::temp_dir().join(format!(
                "tagbox-library-{}-{}",
                name,
                std::process::id()
            ));
            let _ = fs::remove_dir_all(&root);
            fs::create_dir_all(root.join(SYSTEM_DIR)).unwrap();
            Self(root)
        }

        fn file(&self, relative: &str) -> &Self {
            let path = self.0.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"").unwrap();
            self
        }

        fn dir(&self, relative: &str) -> &Self {
            fs::create_dir_all(self.0.join(relative)).unwrap();
            self
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn tag(raw: &str) -> TagId {
        TagId::new(raw).unwrap()
    }

    #[test]
    fn test_natural_order() {
        let mut names = vec!["Part 10", "part 2", "Part 1", "a.mp3"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["a.mp3", "Part 1", "part 2", "Part 10"]);
    }

    #[test]
    fn test_flat_album() {
        let fixture = Fixture::new("flat");
        fixture
            .file("Bedtime 5A00834F9AAA/02 Moon.mp3")
            .file("Bedtime 5A00834F9AAA/01 Lullaby.mp3")
            .file("Bedtime 5A00834F9AAA/.hidden");

        let library = MusicLibrary::scan(&fixture.0).unwrap();
        let songs = library.songs(&tag("5A00834F9AAA")).unwrap();

        assert_eq!(library.len(), 1);
        assert_eq!(songs.len(), 2);
        assert!(songs[0].ends_with("01 Lullaby.mp3"));
    }

    #[test]
    fn test_album_indicator_rotates() {
        let fixture = Fixture::new("rotate");
        fixture
            .file("Stories 5500ACB96BBB/Part 1/a.mp3")
            .file("Stories 5500ACB96BBB/Part 2/a.mp3")
            .file("Stories 5500ACB96BBB/Part 2/.albumindicator")
            .file("Stories 5500ACB96BBB/Part 10/a.mp3");

        let library = MusicLibrary::scan(&fixture.0).unwrap();
        let albums = library.albums(&tag("5500ACB96BBB")).unwrap();
        let names: Vec<_> = albums
            .iter()
            .map(|a| a.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["Part 2", "Part 10", "Part 1"]);
        assert_eq!(albums[0].songs.len(), 1);
    }

    #[test]
    fn test_layout_errors() {
        let fixture = Fixture::new("mixed");
        fixture
            .file("Mixed 5500ACB96BBB/Part 1/a.mp3")
            .file("Mixed 5500ACB96BBB/stray.mp3");
        let err = MusicLibrary::scan(&fixture.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("mixed"));

        let fixture = Fixture::new("naming");
        fixture.dir("no tag here");
        assert!(MusicLibrary::scan(&fixture.0)
            .unwrap_err()
            .to_string()
            .contains("naming convention"));

        let fixture = Fixture::new("twice");
        fixture.file("A 5500ACB96BBB/a.mp3").file("B 5500ACB96BBB/a.mp3");
        assert!(MusicLibrary::scan(&fixture.0)
            .unwrap_err()
            .to_string()
            .contains("found twice"));

        let fixture = Fixture::new("empty");
        fixture.dir("Empty 5500ACB96BBB");
        assert!(MusicLibrary::scan(&fixture.0)
            .unwrap_err()
            .to_string()
            .contains("empty tag directory"));
    }

    #[test]
    fn test_missing_system_directory() {
        let fixture = Fixture::new("nosystem");
        fs::remove_dir_all(fixture.0.join(SYSTEM_DIR)).unwrap();
        assert!(MusicLibrary::scan(&fixture.0).is_err());
    }
}
