//! MovieLens-100k dataset ingestion.
//!
//! Parses the `u.item` (pipe-separated movies with 19 genre-flag columns)
//! and `u.data` (tab-separated ratings) files into the event store. The
//! dataset ships as ISO-8859-1, not UTF-8.

use crate::error::{Result, StoreError};
use crate::store::EventStore;
use crate::types::{Movie, MovieId, UserId};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Genre labels for the 19 flag columns of `u.item`, in file order.
const GENRE_NAMES: [&str; 19] = [
    "unknown",
    "Action",
    "Adventure",
    "Animation",
    "Children",
    "Comedy",
    "Crime",
    "Documentary",
    "Drama",
    "Fantasy",
    "Film-Noir",
    "Horror",
    "Musical",
    "Mystery",
    "Romance",
    "Sci-Fi",
    "Thriller",
    "War",
    "Western",
];

/// Read a Latin-1 encoded file into lines. Each byte maps directly to the
/// matching Unicode code point.
fn read_lines_latin1(path: &Path) -> Result<Vec<String>> {
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let content: String = bytes.iter().map(|&b| b as char).collect();
    Ok(content.lines().map(|s| s.to_string()).collect())
}

fn parse_year(title: &str) -> Option<u16> {
    // Titles end with "(YYYY)".
    let open = title.rfind('(')?;
    let close = title.rfind(')')?;
    title.get(open + 1..close)?.parse().ok()
}

/// Parse `u.item`: `movieId|title|release date|video date|url|flag0..flag18`.
fn parse_movies(path: &Path) -> Result<Vec<Movie>> {
    let file_name = "u.item".to_string();
    let lines = read_lines_latin1(path)?;
    let mut movies = Vec::with_capacity(lines.len());

    for (idx, line) in lines.iter().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() < 2 {
            return Err(StoreError::Parse {
                file: file_name.clone(),
                line: idx + 1,
                reason: "expected at least movieId|title".to_string(),
            });
        }
        let id: MovieId = parts[0].parse().map_err(|_| StoreError::Parse {
            file: file_name.clone(),
            line: idx + 1,
            reason: format!("invalid movie id {:?}", parts[0]),
        })?;
        let title = parts[1].to_string();

        let mut genres = Vec::new();
        if parts.len() >= 24 {
            for (i, flag) in parts[5..24].iter().enumerate() {
                if *flag == "1" {
                    genres.push(GENRE_NAMES[i].to_string());
                }
            }
        }
        if genres.is_empty() {
            genres.push("Unknown".to_string());
        }

        let mut movie = Movie::new(id, title, genres);
        movie.release_year = parse_year(&movie.title);
        movies.push(movie);
    }
    Ok(movies)
}

/// Parse `u.data`: `userId \t movieId \t rating \t timestamp`.
fn parse_ratings(path: &Path) -> Result<Vec<(UserId, MovieId, f32)>> {
    let file_name = "u.data".to_string();
    let lines = read_lines_latin1(path)?;
    let mut ratings = Vec::with_capacity(lines.len());

    for (idx, line) in lines.iter().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            return Err(StoreError::Parse {
                file: file_name.clone(),
                line: idx + 1,
                reason: "expected userId, movieId and rating".to_string(),
            });
        }
        let parse_field = |value: &str, name: &str| {
            value.parse::<f32>().map_err(|_| StoreError::Parse {
                file: file_name.clone(),
                line: idx + 1,
                reason: format!("invalid {name} {value:?}"),
            })
        };
        let user_id = parse_field(parts[0], "userId")? as UserId;
        let movie_id = parse_field(parts[1], "movieId")? as MovieId;
        let rating = parse_field(parts[2], "rating")?;
        ratings.push((user_id, movie_id, rating));
    }
    Ok(ratings)
}

/// Load the MovieLens-100k dataset from `data_dir` into a fresh store.
///
/// `user_limit` caps how many distinct users (lowest ids first) get their
/// ratings loaded, matching the original seeding behavior; `None` loads all.
pub fn load_movielens(data_dir: &Path, user_limit: Option<usize>) -> Result<EventStore> {
    let movies = parse_movies(&data_dir.join("u.item"))?;
    let ratings = parse_ratings(&data_dir.join("u.data"))?;

    let mut store = EventStore::new();
    for movie in movies {
        store.insert_movie(movie);
    }

    let keep: Option<BTreeSet<UserId>> = user_limit.map(|limit| {
        ratings
            .iter()
            .map(|(u, _, _)| *u)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .take(limit)
            .collect()
    });

    let mut loaded = 0usize;
    for (user_id, movie_id, rating) in ratings {
        if let Some(keep) = &keep {
            if !keep.contains(&user_id) {
                continue;
            }
        }
        // Ratings referencing movies missing from u.item are skipped.
        match store.submit_rating(user_id, movie_id, rating, None) {
            Ok(_) => loaded += 1,
            Err(StoreError::UnknownMovie(_)) => continue,
            Err(e) => return Err(e),
        }
    }

    let (users, movies, _) = store.counts();
    info!(users, movies, ratings = loaded, "loaded MovieLens dataset");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_load_small_dataset() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "u.item",
            "1|Toy Story (1995)|01-Jan-1995||url|0|0|0|1|1|1|0|0|0|0|0|0|0|0|0|0|0|0|0\n\
             2|GoldenEye (1995)|01-Jan-1995||url|0|1|1|0|0|0|0|0|0|0|0|0|0|0|0|0|1|0|0\n",
        );
        write_file(dir.path(), "u.data", "1\t1\t5\t874965758\n1\t2\t3\t876893171\n2\t1\t4\t878542960\n");

        let store = load_movielens(dir.path(), None).unwrap();
        assert_eq!(store.movie_count(), 2);
        assert_eq!(store.total_ratings(), 3);

        let toy_story = store.get_movie(1).unwrap();
        assert_eq!(toy_story.release_year, Some(1995));
        assert_eq!(toy_story.genres, vec!["Animation", "Children", "Comedy"]);
    }

    #[test]
    fn test_user_limit_takes_lowest_ids() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "u.item",
            "1|A (1990)|||url|0|0|0|0|0|0|0|0|1|0|0|0|0|0|0|0|0|0|0\n",
        );
        write_file(dir.path(), "u.data", "3\t1\t5\t0\n1\t1\t4\t0\n2\t1\t3\t0\n");

        let store = load_movielens(dir.path(), Some(2)).unwrap();
        assert_eq!(store.rating_users(), vec![1, 2]);
    }

    #[test]
    fn test_malformed_line_reports_location() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "u.item", "not-a-movie\n");
        write_file(dir.path(), "u.data", "");

        let err = load_movielens(dir.path(), None).unwrap_err();
        match err {
            StoreError::Parse { file, line, .. } => {
                assert_eq!(file, "u.item");
                assert_eq!(line, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
