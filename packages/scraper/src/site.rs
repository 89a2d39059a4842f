//! URL layout of the crawled site.

use film_walk_diary_models::{MovieRef, UserHandle};

/// Default site root.
pub const DEFAULT_BASE_URL: &str = "https://letterboxd.com";

/// Builds the URLs the crawler requests, relative to one site root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteUrls {
    base_url: String,
}

impl Default for SiteUrls {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl SiteUrls {
    /// Creates a URL builder for `base_url` (trailing `/` is ignored).
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// The site root without a trailing `/`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The landing page, sampled for film links.
    #[must_use]
    pub fn landing(&self) -> String {
        format!("{}/", self.base_url)
    }

    /// Absolute URL of a film page.
    #[must_use]
    pub fn film(&self, movie: &MovieRef) -> String {
        format!("{}{}", self.base_url, movie.as_str())
    }

    /// Page `page` of a film's member listing.
    #[must_use]
    pub fn members_page(&self, movie: &MovieRef, page: u32) -> String {
        format!("{}members/page/{page}", self.film(movie))
    }

    /// Page `page` of a user's diary.
    #[must_use]
    pub fn diary_page(&self, handle: &UserHandle, page: u32) -> String {
        format!("{}films/diary/page/{page}", handle.profile_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_member_and_diary_urls() {
        let site = SiteUrls::new("https://letterboxd.com/");
        let movie = MovieRef::new("/film/foo/");
        let handle = UserHandle::parse(site.base_url(), "/alice/").unwrap();

        assert_eq!(site.landing(), "https://letterboxd.com/");
        assert_eq!(
            site.members_page(&movie, 3),
            "https://letterboxd.com/film/foo/members/page/3"
        );
        assert_eq!(
            site.diary_page(&handle, 2),
            "https://letterboxd.com/alice/films/diary/page/2"
        );
    }
}
