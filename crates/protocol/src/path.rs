use crate::server::ServerType;
use std::fmt;

/// Path syntax family of a server, derived from its [`ServerType`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PathSyntax {
    /// `/`-separated, absolute paths start with a slash.
    #[default]
    Unix,
    /// `C:\dir\sub`, backslash separated, case-insensitive.
    Dos,
    /// `C:/dir/sub`, DOS semantics with forward slashes.
    DosFwdSlashes,
    /// `DEVICE:[DIR.SUB]`, file names appended after the bracket.
    Vms,
    /// `'HLQ.MLQ.LLQ'`, dot-separated data-set qualifiers.
    Mvs,
    /// `\node.$volume.subvol`, dot separated below the node.
    HpNonStop,
    /// `device:/dir/sub`.
    VxWorks,
}

impl PathSyntax {
    /// Maps a server-type hint to its path syntax.
    #[must_use]
    pub const fn for_server(server_type: ServerType) -> Self {
        match server_type {
            ServerType::Default | ServerType::Unix | ServerType::Cygwin => Self::Unix,
            ServerType::Dos => Self::Dos,
            ServerType::DosFwdSlashes => Self::DosFwdSlashes,
            ServerType::Vms => Self::Vms,
            ServerType::Mvs | ServerType::Zvm => Self::Mvs,
            ServerType::HpNonStop => Self::HpNonStop,
            ServerType::VxWorks => Self::VxWorks,
        }
    }

    const fn separator(self) -> char {
        match self {
            Self::Unix | Self::DosFwdSlashes | Self::VxWorks => '/',
            Self::Dos => '\\',
            Self::Vms | Self::Mvs | Self::HpNonStop => '.',
        }
    }

    const fn case_insensitive(self) -> bool {
        matches!(self, Self::Dos | Self::DosFwdSlashes | Self::Vms | Self::Mvs)
    }
}

/// A directory path in a server's native syntax.
///
/// The empty path is the "not yet known" value used for a control socket
/// whose working directory has not been observed (or was invalidated by a
/// peer engine).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ServerPath {
    syntax: PathSyntax,
    /// Device / drive / node component preceding the directory segments:
    /// `C:` (DOS), `DEVICE` (VMS), `dev:` (VxWorks), `\node` (NonStop).
    prefix: Option<String>,
    segments: Vec<String>,
}

impl ServerPath {
    /// The empty (unknown) path for a syntax.
    #[must_use]
    pub const fn empty(syntax: PathSyntax) -> Self {
        Self {
            syntax,
            prefix: None,
            segments: Vec::new(),
        }
    }

    /// Parses an absolute path in the given syntax. Returns `None` for
    /// input that is not an absolute path in that dialect.
    #[must_use]
    pub fn parse(syntax: PathSyntax, input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        match syntax {
            PathSyntax::Unix => Self::parse_unix(syntax, input, '/'),
            PathSyntax::Dos | PathSyntax::DosFwdSlashes => Self::parse_dos(syntax, input),
            PathSyntax::Vms => Self::parse_vms(input),
            PathSyntax::Mvs => Self::parse_mvs(input),
            PathSyntax::HpNonStop => Self::parse_nonstop(input),
            PathSyntax::VxWorks => Self::parse_vxworks(input),
        }
    }

    fn parse_unix(syntax: PathSyntax, input: &str, sep: char) -> Option<Self> {
        if !input.starts_with(sep) {
            return None;
        }
        let segments = input
            .split(sep)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        Some(Self {
            syntax,
            prefix: None,
            segments,
        })
    }

    fn parse_dos(syntax: PathSyntax, input: &str) -> Option<Self> {
        let mut chars = input.chars();
        let drive = chars.next()?;
        if !drive.is_ascii_alphabetic() || chars.next() != Some(':') {
            return None;
        }
        let rest = &input[2..];
        let segments = rest
            .split(['\\', '/'])
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        Some(Self {
            syntax,
            prefix: Some(format!("{}:", drive.to_ascii_uppercase())),
            segments,
        })
    }

    fn parse_vms(input: &str) -> Option<Self> {
        let open = input.find(":[")?;
        if !input.ends_with(']') {
            return None;
        }
        let device = &input[..open];
        let dirs = &input[open + 2..input.len() - 1];
        if device.is_empty() {
            return None;
        }
        let segments = dirs
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        Some(Self {
            syntax: PathSyntax::Vms,
            prefix: Some(device.to_owned()),
            segments,
        })
    }

    fn parse_mvs(input: &str) -> Option<Self> {
        let inner = input
            .strip_prefix('\'')
            .map_or(input, |s| s.strip_suffix('\'').unwrap_or(s));
        let inner = inner.strip_suffix('.').unwrap_or(inner);
        if inner.is_empty() {
            return None;
        }
        let segments: Vec<String> = inner.split('.').map(str::to_owned).collect();
        if segments.iter().any(String::is_empty) {
            return None;
        }
        Some(Self {
            syntax: PathSyntax::Mvs,
            prefix: None,
            segments,
        })
    }

    fn parse_nonstop(input: &str) -> Option<Self> {
        if !input.starts_with('\\') {
            return None;
        }
        let mut segments: Vec<String> = input[1..].split('.').map(str::to_owned).collect();
        if segments.iter().any(String::is_empty) {
            return None;
        }
        let node = format!("\\{}", segments.remove(0));
        Some(Self {
            syntax: PathSyntax::HpNonStop,
            prefix: Some(node),
            segments,
        })
    }

    fn parse_vxworks(input: &str) -> Option<Self> {
        let colon = input.find(':')?;
        let device = &input[..=colon];
        if device.len() < 2 {
            return None;
        }
        let rest = &input[colon + 1..];
        let segments = rest
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        Some(Self {
            syntax: PathSyntax::VxWorks,
            prefix: Some(device.to_owned()),
            segments,
        })
    }

    /// Path syntax this path is expressed in.
    #[must_use]
    pub const fn syntax(&self) -> PathSyntax {
        self.syntax
    }

    /// Returns `true` for the unknown path.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.prefix.is_none()
    }

    /// Returns `true` if the path has a parent directory.
    #[must_use]
    pub fn has_parent(&self) -> bool {
        !self.segments.is_empty()
    }

    /// The parent directory, if any.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        let mut parent = self.clone();
        parent.segments.pop();
        Some(parent)
    }

    /// The deepest segment, if any.
    #[must_use]
    pub fn last_segment(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Appends one segment. Fails if the name embeds a separator of this
    /// syntax.
    pub fn add_segment(&mut self, name: &str) -> bool {
        if name.is_empty() || name.contains(self.syntax.separator()) {
            return false;
        }
        self.segments.push(name.to_owned());
        true
    }

    /// Changes into `target`: an absolute path replaces this one, anything
    /// else is resolved relative to it (`.` and `..` honoured for the
    /// slash-separated syntaxes). Returns `None` when the input cannot be
    /// interpreted.
    #[must_use]
    pub fn change_to(&self, target: &str) -> Option<Self> {
        let target = target.trim();
        if target.is_empty() {
            return Some(self.clone());
        }
        if let Some(absolute) = Self::parse(self.syntax, target) {
            return Some(absolute);
        }
        if self.is_empty() {
            return None;
        }
        let sep = self.syntax.separator();
        let mut result = self.clone();
        for piece in target.split(sep).filter(|p| !p.is_empty()) {
            match piece {
                "." => {}
                ".." => {
                    result.segments.pop()?;
                }
                _ => result.segments.push(piece.to_owned()),
            }
        }
        Some(result)
    }

    /// Formats `name` as a full remote path below this directory.
    #[must_use]
    pub fn format_filename(&self, name: &str) -> String {
        match self.syntax {
            PathSyntax::Vms => format!("{}{}", self, name),
            PathSyntax::Mvs => {
                // A file inside a data-set path is a PDS member.
                let quals = self.segments.join(".");
                format!("'{quals}({name})'")
            }
            PathSyntax::HpNonStop => format!("{}.{}", self, name),
            _ => {
                let base = self.to_string();
                let sep = self.syntax.separator();
                if base.ends_with(sep) {
                    format!("{base}{name}")
                } else {
                    format!("{base}{sep}{name}")
                }
            }
        }
    }

    /// Returns `true` when `self` is a (transitive) subdirectory of
    /// `parent`, honouring the dialect's case sensitivity.
    #[must_use]
    pub fn is_subdir_of(&self, parent: &Self) -> bool {
        if self.syntax != parent.syntax
            || self.segments.len() <= parent.segments.len()
            || !eq_component(self.syntax, self.prefix.as_deref(), parent.prefix.as_deref())
        {
            return false;
        }
        self.segments
            .iter()
            .zip(&parent.segments)
            .all(|(a, b)| eq_component(self.syntax, Some(a), Some(b)))
    }

    /// Inverse of [`ServerPath::is_subdir_of`].
    #[must_use]
    pub fn is_parent_of(&self, child: &Self) -> bool {
        child.is_subdir_of(self)
    }

    /// Returns `true` when both paths name the same directory, honouring
    /// the dialect's case sensitivity.
    #[must_use]
    pub fn same_dir(&self, other: &Self) -> bool {
        self.syntax == other.syntax
            && self.segments.len() == other.segments.len()
            && eq_component(self.syntax, self.prefix.as_deref(), other.prefix.as_deref())
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| eq_component(self.syntax, Some(a), Some(b)))
    }
}

fn eq_component(syntax: PathSyntax, a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            if syntax.case_insensitive() {
                a.eq_ignore_ascii_case(b)
            } else {
                a == b
            }
        }
        _ => false,
    }
}

impl fmt::Display for ServerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.syntax {
            PathSyntax::Unix => {
                if self.segments.is_empty() {
                    f.write_str("/")
                } else {
                    write!(f, "/{}", self.segments.join("/"))
                }
            }
            PathSyntax::Dos => {
                let drive = self.prefix.as_deref().unwrap_or("");
                write!(f, "{drive}\\{}", self.segments.join("\\"))
            }
            PathSyntax::DosFwdSlashes => {
                let drive = self.prefix.as_deref().unwrap_or("");
                write!(f, "{drive}/{}", self.segments.join("/"))
            }
            PathSyntax::Vms => {
                let device = self.prefix.as_deref().unwrap_or("");
                write!(f, "{device}:[{}]", self.segments.join("."))
            }
            PathSyntax::Mvs => write!(f, "'{}'", self.segments.join(".")),
            PathSyntax::HpNonStop => {
                let node = self.prefix.as_deref().unwrap_or("");
                if self.segments.is_empty() {
                    f.write_str(node)
                } else {
                    write!(f, "{node}.{}", self.segments.join("."))
                }
            }
            PathSyntax::VxWorks => {
                let device = self.prefix.as_deref().unwrap_or("");
                write!(f, "{device}/{}", self.segments.join("/"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_roundtrip_and_navigation() {
        let path = ServerPath::parse(PathSyntax::Unix, "/pub/files").expect("parses");
        assert_eq!(path.to_string(), "/pub/files");
        assert_eq!(path.last_segment(), Some("files"));
        assert_eq!(path.parent().expect("has parent").to_string(), "/pub");
        assert_eq!(path.format_filename("a.txt"), "/pub/files/a.txt");

        let root = ServerPath::parse(PathSyntax::Unix, "/").expect("parses");
        assert_eq!(root.to_string(), "/");
        assert!(!root.has_parent());
        assert_eq!(root.format_filename("a"), "/a");
    }

    #[test]
    fn relative_change_to_resolves_dots() {
        let path = ServerPath::parse(PathSyntax::Unix, "/a/b/c").expect("parses");
        let up = path.change_to("../../x").expect("resolves");
        assert_eq!(up.to_string(), "/a/x");
        let absolute = path.change_to("/other").expect("resolves");
        assert_eq!(absolute.to_string(), "/other");
        assert!(path.change_to("../../../../y").is_none());
    }

    #[test]
    fn dos_paths_are_case_insensitive() {
        let a = ServerPath::parse(PathSyntax::Dos, "C:\\Data\\Sub").expect("parses");
        let b = ServerPath::parse(PathSyntax::Dos, "c:\\data").expect("parses");
        assert!(a.is_subdir_of(&b));
        assert_eq!(a.to_string(), "C:\\Data\\Sub");
    }

    #[test]
    fn vms_paths_keep_device_and_bracket_syntax() {
        let path = ServerPath::parse(PathSyntax::Vms, "SYS$DISK:[PUB.FILES]").expect("parses");
        assert_eq!(path.to_string(), "SYS$DISK:[PUB.FILES]");
        assert_eq!(path.format_filename("README.TXT;1"), "SYS$DISK:[PUB.FILES]README.TXT;1");
        assert_eq!(path.parent().expect("parent").to_string(), "SYS$DISK:[PUB]");
        assert!(ServerPath::parse(PathSyntax::Vms, "[NODEVICE]").is_none());
    }

    #[test]
    fn mvs_members_format_in_parentheses() {
        let path = ServerPath::parse(PathSyntax::Mvs, "'SYS1.PROCLIB'").expect("parses");
        assert_eq!(path.format_filename("MEMBER"), "'SYS1.PROCLIB(MEMBER)'");
        assert_eq!(path.to_string(), "'SYS1.PROCLIB'");
    }

    #[test]
    fn nonstop_node_is_preserved() {
        let path = ServerPath::parse(PathSyntax::HpNonStop, "\\prod.$data.sub").expect("parses");
        assert_eq!(path.to_string(), "\\prod.$data.sub");
        assert_eq!(path.last_segment(), Some("sub"));
    }

    #[test]
    fn subdir_requires_proper_ancestry() {
        let parent = ServerPath::parse(PathSyntax::Unix, "/x").expect("parses");
        let child = ServerPath::parse(PathSyntax::Unix, "/x/y/z").expect("parses");
        let sibling = ServerPath::parse(PathSyntax::Unix, "/xy").expect("parses");
        assert!(child.is_subdir_of(&parent));
        assert!(!sibling.is_subdir_of(&parent));
        assert!(!parent.is_subdir_of(&parent));
    }

    #[test]
    fn add_segment_rejects_embedded_separators() {
        let mut path = ServerPath::parse(PathSyntax::Unix, "/a").expect("parses");
        assert!(!path.add_segment("b/c"));
        assert!(path.add_segment("b"));
        assert_eq!(path.to_string(), "/a/b");
    }
}
