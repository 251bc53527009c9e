use std::path::{Path, PathBuf};

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

pub fn join_path(dir: &str, file_name: &str) -> String {
    let p: PathBuf = [dir, file_name].iter().collect();
    p.as_path().display().to_string()
}

/// The first run of four digits in the file name, read as a year.
pub fn year_from_file_name(path: &str) -> Option<i32> {
    let name = simplify_file_name(path);
    let chars: Vec<char> = name.chars().collect();
    let mut idx = 0;
    while idx < chars.len() {
        if chars[idx].is_ascii_digit() {
            let start = idx;
            while idx < chars.len() && chars[idx].is_ascii_digit() {
                idx += 1;
            }
            if idx - start == 4 {
                let s: String = chars[start..idx].iter().collect();
                return s.parse::<i32>().ok();
            }
        } else {
            idx += 1;
        }
    }
    None
}

/// Reads the reappointment flags found in the source files.
///
/// Empty cells are `false`. Returns None for anything not understood.
pub fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" | "1.0" => Some(true),
        "false" | "f" | "no" | "n" | "0" | "0.0" | "" => Some(false),
        _ => None,
    }
}

/// Reads a year, also accepting the `2015.0` form written by spreadsheets.
pub fn parse_year(s: &str) -> Option<i32> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(y) = t.parse::<i32>() {
        return Some(y);
    }
    match t.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 => Some(f as i32),
        _ => None,
    }
}

/// Counts may also have been written as floats by other tools.
pub fn parse_count(s: &str) -> Option<u64> {
    let t = s.trim();
    if t.is_empty() {
        return Some(0);
    }
    if let Ok(c) = t.parse::<u64>() {
        return Some(c);
    }
    match t.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 => Some(f as u64),
        _ => None,
    }
}

/// An undefined rate is written as an empty cell.
pub fn format_rate(rate: Option<f64>) -> String {
    match rate {
        Some(r) => r.to_string(),
        None => String::new(),
    }
}

pub fn parse_rate(s: &str) -> Option<Option<f64>> {
    let t = s.trim();
    if t.is_empty() || t.eq_ignore_ascii_case("nan") {
        return Some(None);
    }
    t.parse::<f64>().ok().map(Some)
}

pub fn format_year(year: Option<i32>) -> String {
    year.map(|y| y.to_string()).unwrap_or_default()
}
