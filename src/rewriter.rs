//! playlist url rewriting.
//!
//! the body is split into whitespace runs and non-whitespace words. every
//! word that starts with `http` is replaced by
//! `{proxy_origin}/proxy?url={percent-encoded word}`; everything else,
//! including line endings, is copied through untouched.
//!
//! urls inside a word are left alone. `URI="https://..."` attributes of
//! `#EXT-X-KEY` and `#EXT-X-MAP` stay pointed at the origin, so players
//! fetch keys and init segments directly and those bypass the proxy.
//!
//! rewriting is not idempotent. a rewritten word starts with the proxy
//! origin, which usually starts with `http` itself, so a second pass wraps
//! it again. rewrite each fetched body exactly once.

const URL_PREFIX: &str = "http";
const PROXY_PATH: &str = "/proxy?url=";

/// `\s` as playlists are usually matched: unicode whitespace plus the bom
fn is_space(c: char) -> bool {
    c.is_whitespace() || c == '\u{feff}'
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Space(&'a str),
    Word(&'a str),
}

struct Segments<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.chars().next()?;
        let space = is_space(first);
        let end = self
            .rest
            .char_indices()
            .find(|&(_, c)| is_space(c) != space)
            .map_or(self.rest.len(), |(i, _)| i);
        let (head, tail) = self.rest.split_at(end);
        self.rest = tail;
        Some(if space {
            Segment::Space(head)
        } else {
            Segment::Word(head)
        })
    }
}

fn segments(body: &str) -> Segments<'_> {
    Segments { rest: body }
}

/// a word is rewritten when it starts with the literal `http` and has
/// something after it
fn is_url_word(word: &str) -> bool {
    word.len() > URL_PREFIX.len() && word.starts_with(URL_PREFIX)
}

pub fn proxied_url(proxy_origin: &str, target: &str) -> String {
    format!("{}{}{}", proxy_origin, PROXY_PATH, urlencoding::encode(target))
}

pub fn rewrite(body: &str, proxy_origin: &str) -> String {
    let mut out = String::with_capacity(body.len() + body.len() / 2);
    for segment in segments(body) {
        match segment {
            Segment::Word(word) if is_url_word(word) => {
                out.push_str(&proxied_url(proxy_origin, word));
            }
            Segment::Word(text) | Segment::Space(text) => out.push_str(text),
        }
    }
    out
}
