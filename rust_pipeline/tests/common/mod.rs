use std::fs;
use std::path::{Path, PathBuf};

pub const TIME: &str = "11/11/2019 9:05:58 AM";

/// Small MIND-shaped fixture.
///
/// N2 repeats N1's title. Session 3 has a one-item history, session 4 reads
/// an article missing from the catalog and U5 has no history at all.
pub fn write_fixture(dir: &Path) -> (PathBuf, PathBuf) {
    let news: String = (1..=12)
        .map(|n| {
            let title = if n == 2 { "Title 1".to_string() } else { format!("Title {n}") };
            format!("N{n}\tnews\tnewsus\t{title}\tabstract {n}\thttps://example.com/{n}\t[]\t[]\n")
        })
        .collect();

    let rows = [
        ("1", "U1", "N2 N3 N4 N5 N6", "N7-1 N2-0"),
        ("2", "U2", "N1 N3 N5 N7 N4", "N8-1 N9-0"),
        ("3", "U3", "N1", "N3-1"),
        ("4", "U4", "N1 N3 N4 N5 N99", "N3-1"),
        ("5", "U1", "N3 N4 N5 N6 N7", "N8-1"),
        ("6", "U5", "", "N3-1"),
        ("7", "U6", "N8 N9 N10 N11 N12", "N1-1"),
    ];
    let behaviors: String = rows
        .iter()
        .map(|(id, user, hist, imps)| format!("{id}\t{user}\t{TIME}\t{hist}\t{imps}\n"))
        .collect();

    let news_path = dir.join("news.tsv");
    let behaviors_path = dir.join("behaviors.tsv");
    fs::write(&news_path, news).unwrap();
    fs::write(&behaviors_path, behaviors).unwrap();
    (behaviors_path, news_path)
}

pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}
