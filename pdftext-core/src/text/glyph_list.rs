//! Glyph name to Unicode lookup
//!
//! Covers the Adobe Glyph List names used by the standard Latin encodings
//! plus a handful of common extras, and the `uniXXXX` / `uXXXX` forms.

use lazy_static::lazy_static;
use std::collections::HashMap;

lazy_static! {
    static ref GLYPH_LIST: HashMap<&'static str, char> = {
        let entries: &[(&str, char)] = &[
            // ASCII punctuation and digits
            ("space", ' '),
            ("exclam", '!'),
            ("quotedbl", '"'),
            ("numbersign", '#'),
            ("dollar", '$'),
            ("percent", '%'),
            ("ampersand", '&'),
            ("quotesingle", '\''),
            ("parenleft", '('),
            ("parenright", ')'),
            ("asterisk", '*'),
            ("plus", '+'),
            ("comma", ','),
            ("hyphen", '-'),
            ("period", '.'),
            ("slash", '/'),
            ("zero", '0'),
            ("one", '1'),
            ("two", '2'),
            ("three", '3'),
            ("four", '4'),
            ("five", '5'),
            ("six", '6'),
            ("seven", '7'),
            ("eight", '8'),
            ("nine", '9'),
            ("colon", ':'),
            ("semicolon", ';'),
            ("less", '<'),
            ("equal", '='),
            ("greater", '>'),
            ("question", '?'),
            ("at", '@'),
            ("bracketleft", '['),
            ("backslash", '\\'),
            ("bracketright", ']'),
            ("asciicircum", '^'),
            ("underscore", '_'),
            ("grave", '`'),
            ("braceleft", '{'),
            ("bar", '|'),
            ("braceright", '}'),
            ("asciitilde", '~'),
            // Latin-1 supplement
            ("nbspace", '\u{00A0}'),
            ("nonbreakingspace", '\u{00A0}'),
            ("exclamdown", '¡'),
            ("cent", '¢'),
            ("sterling", '£'),
            ("currency", '¤'),
            ("yen", '¥'),
            ("brokenbar", '¦'),
            ("section", '§'),
            ("dieresis", '¨'),
            ("copyright", '©'),
            ("ordfeminine", 'ª'),
            ("guillemotleft", '«'),
            ("logicalnot", '¬'),
            ("sfthyphen", '\u{00AD}'),
            ("registered", '®'),
            ("macron", '¯'),
            ("degree", '°'),
            ("plusminus", '±'),
            ("twosuperior", '²'),
            ("threesuperior", '³'),
            ("acute", '´'),
            ("mu", 'µ'),
            ("paragraph", '¶'),
            ("periodcentered", '·'),
            ("cedilla", '¸'),
            ("onesuperior", '¹'),
            ("ordmasculine", 'º'),
            ("guillemotright", '»'),
            ("onequarter", '¼'),
            ("onehalf", '½'),
            ("threequarters", '¾'),
            ("questiondown", '¿'),
            ("Agrave", 'À'),
            ("Aacute", 'Á'),
            ("Acircumflex", 'Â'),
            ("Atilde", 'Ã'),
            ("Adieresis", 'Ä'),
            ("Aring", 'Å'),
            ("AE", 'Æ'),
            ("Ccedilla", 'Ç'),
            ("Egrave", 'È'),
            ("Eacute", 'É'),
            ("Ecircumflex", 'Ê'),
            ("Edieresis", 'Ë'),
            ("Igrave", 'Ì'),
            ("Iacute", 'Í'),
            ("Icircumflex", 'Î'),
            ("Idieresis", 'Ï'),
            ("Eth", 'Ð'),
            ("Ntilde", 'Ñ'),
            ("Ograve", 'Ò'),
            ("Oacute", 'Ó'),
            ("Ocircumflex", 'Ô'),
            ("Otilde", 'Õ'),
            ("Odieresis", 'Ö'),
            ("multiply", '×'),
            ("Oslash", 'Ø'),
            ("Ugrave", 'Ù'),
            ("Uacute", 'Ú'),
            ("Ucircumflex", 'Û'),
            ("Udieresis", 'Ü'),
            ("Yacute", 'Ý'),
            ("Thorn", 'Þ'),
            ("germandbls", 'ß'),
            ("agrave", 'à'),
            ("aacute", 'á'),
            ("acircumflex", 'â'),
            ("atilde", 'ã'),
            ("adieresis", 'ä'),
            ("aring", 'å'),
            ("ae", 'æ'),
            ("ccedilla", 'ç'),
            ("egrave", 'è'),
            ("eacute", 'é'),
            ("ecircumflex", 'ê'),
            ("edieresis", 'ë'),
            ("igrave", 'ì'),
            ("iacute", 'í'),
            ("icircumflex", 'î'),
            ("idieresis", 'ï'),
            ("eth", 'ð'),
            ("ntilde", 'ñ'),
            ("ograve", 'ò'),
            ("oacute", 'ó'),
            ("ocircumflex", 'ô'),
            ("otilde", 'õ'),
            ("odieresis", 'ö'),
            ("divide", '÷'),
            ("oslash", 'ø'),
            ("ugrave", 'ù'),
            ("uacute", 'ú'),
            ("ucircumflex", 'û'),
            ("udieresis", 'ü'),
            ("yacute", 'ý'),
            ("thorn", 'þ'),
            ("ydieresis", 'ÿ'),
            // Latin extended, spacing modifiers, ligatures
            ("dotlessi", 'ı'),
            ("Lslash", 'Ł'),
            ("lslash", 'ł'),
            ("OE", 'Œ'),
            ("oe", 'œ'),
            ("Scaron", 'Š'),
            ("scaron", 'š'),
            ("Ydieresis", 'Ÿ'),
            ("Zcaron", 'Ž'),
            ("zcaron", 'ž'),
            ("florin", 'ƒ'),
            ("circumflex", 'ˆ'),
            ("caron", 'ˇ'),
            ("breve", '˘'),
            ("dotaccent", '˙'),
            ("ring", '˚'),
            ("ogonek", '˛'),
            ("tilde", '˜'),
            ("hungarumlaut", '˝'),
            ("ff", 'ﬀ'),
            ("fi", 'ﬁ'),
            ("fl", 'ﬂ'),
            ("ffi", 'ﬃ'),
            ("ffl", 'ﬄ'),
            // General punctuation and symbols
            ("endash", '–'),
            ("emdash", '—'),
            ("quoteleft", '‘'),
            ("quoteright", '’'),
            ("quotesinglbase", '‚'),
            ("quotedblleft", '“'),
            ("quotedblright", '”'),
            ("quotedblbase", '„'),
            ("dagger", '†'),
            ("daggerdbl", '‡'),
            ("bullet", '•'),
            ("ellipsis", '…'),
            ("perthousand", '‰'),
            ("guilsinglleft", '‹'),
            ("guilsinglright", '›'),
            ("fraction", '⁄'),
            ("Euro", '€'),
            ("trademark", '™'),
            ("minus", '−'),
            ("notequal", '≠'),
            ("infinity", '∞'),
            ("lessequal", '≤'),
            ("greaterequal", '≥'),
            ("partialdiff", '∂'),
            ("summation", '∑'),
            ("product", '∏'),
            ("integral", '∫'),
            ("radical", '√'),
            ("approxequal", '≈'),
            ("Delta", '∆'),
            ("lozenge", '◊'),
            ("Omega", 'Ω'),
            ("pi", 'π'),
            ("mu1", 'µ'),
            ("apple", '\u{F8FF}'),
            // Greek
            ("alpha", 'α'),
            ("beta", 'β'),
            ("gamma", 'γ'),
            ("delta", 'δ'),
            ("epsilon", 'ε'),
            ("lambda", 'λ'),
            ("sigma", 'σ'),
            ("omega", 'ω'),
        ];
        entries.iter().copied().collect()
    };
}

/// Map a glyph name to its Unicode character.
///
/// Names such as `g42` or `cid17` carry no Unicode meaning and yield `None`.
pub fn glyph_name_to_unicode(name: &str) -> Option<char> {
    if let Some(&ch) = GLYPH_LIST.get(name) {
        return Some(ch);
    }

    // Single-letter names are the letters themselves
    let mut chars = name.chars();
    if let (Some(ch), None) = (chars.next(), chars.next()) {
        if ch.is_ascii_alphabetic() {
            return Some(ch);
        }
    }

    if let Some(hex) = name.strip_prefix("uni") {
        if hex.len() >= 4 && hex.len() % 4 == 0 {
            return parse_code_point(&hex[..4]);
        }
    }

    if let Some(hex) = name.strip_prefix('u') {
        if (4..=6).contains(&hex.len()) {
            return parse_code_point(hex);
        }
    }

    // Suffixed variants, e.g. `a.sc` or `one.oldstyle`
    if let Some((base, _)) = name.split_once('.') {
        if !base.is_empty() {
            return glyph_name_to_unicode(base);
        }
    }

    None
}

fn parse_code_point(hex: &str) -> Option<char> {
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(hex, 16)
        .ok()
        .filter(|&cp| !(0xD800..=0xDFFF).contains(&cp))
        .and_then(char::from_u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_names() {
        assert_eq!(glyph_name_to_unicode("space"), Some(' '));
        assert_eq!(glyph_name_to_unicode("A"), Some('A'));
        assert_eq!(glyph_name_to_unicode("zero"), Some('0'));
        assert_eq!(glyph_name_to_unicode("bullet"), Some('•'));
        assert_eq!(glyph_name_to_unicode("fi"), Some('ﬁ'));
    }

    #[test]
    fn test_uni_forms() {
        assert_eq!(glyph_name_to_unicode("uni0041"), Some('A'));
        assert_eq!(glyph_name_to_unicode("uni20AC"), Some('€'));
        assert_eq!(glyph_name_to_unicode("u1F600"), Some('😀'));
        assert_eq!(glyph_name_to_unicode("uniD800"), None);
    }

    #[test]
    fn test_suffixed_and_unknown() {
        assert_eq!(glyph_name_to_unicode("a.sc"), Some('a'));
        assert_eq!(glyph_name_to_unicode("g42"), None);
        assert_eq!(glyph_name_to_unicode("cid17"), None);
        assert_eq!(glyph_name_to_unicode("unknown"), None);
    }
}
