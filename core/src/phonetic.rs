//! Phonetic keys for personal names.
//!
//! A key is the lowercase pinyin of every CJK ideograph followed in place by
//! any Latin letters, with everything else stripped. "张三", "Zhang San" and
//! "zhang-san" all produce "zhangsan".

use pinyin::ToPinyin;

fn is_cjk_ideograph(c: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

pub fn phonetic_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len() * 2);
    for c in name.chars() {
        if is_cjk_ideograph(c) {
            if let Some(p) = c.to_pinyin() {
                key.push_str(p.plain());
            }
        } else if c.is_ascii_alphabetic() {
            key.push(c.to_ascii_lowercase());
        }
    }
    key
}

/// `1 - edit_distance / max_len`, counted in chars. Two empty strings
/// are identical (1.0).
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}
