use std::path::{Component, Path, PathBuf};

use url::Url;

const FALLBACK_FILENAME: &str = "download";

/// 把相对于根目录的路径解析为绝对路径，越出根目录时返回 None。
///
/// `root` 必须是已经 canonicalize 过的绝对路径。只做词法解析，
/// 符号链接的检查由调用方在目录存在后完成。
pub fn resolve_within_root(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    for component in Path::new(relative.trim_start_matches(['/', '\\'])).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if resolved == root {
                    return None;
                }
                resolved.pop();
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

/// 判断 child 是否等于 parent 或位于 parent 之下
pub fn is_sub_path(parent: &Path, child: &Path) -> bool {
    child.starts_with(parent)
}

/// 从 URL 的最后一段路径推导文件名
pub fn filename_from_url(raw_url: &str) -> String {
    let Ok(url) = Url::parse(raw_url) else {
        return FALLBACK_FILENAME.to_string();
    };

    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|last| !last.is_empty())
        .map(|last| {
            let decoded = urlencoding::decode(last)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| last.to_string());
            sanitize_filename(&decoded)
        })
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string())
}

/// 替换常见文件系统不允许的字符: / \ : * ? " < > |
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = sanitized.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        FALLBACK_FILENAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// 第 n 个候选文件名: big.bin, big (1).bin, big (2).bin ...
pub fn numbered_filename(name: &str, n: usize) -> String {
    if n == 0 {
        return name.to_string();
    }
    let path = Path::new(name);
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => format!(
            "{} ({}).{}",
            stem.to_string_lossy(),
            n,
            ext.to_string_lossy()
        ),
        _ => format!("{} ({})", name, n),
    }
}
