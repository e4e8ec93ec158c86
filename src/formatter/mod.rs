use crate::search::SearchHit;
use serde::Serialize;

/// Output format types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Format {
    Cli,
    Json,
    Markdown,
    Csv,
    Files,
}

impl Format {
    pub fn from_string(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "md" | "markdown" => Self::Markdown,
            "csv" => Self::Csv,
            "files" | "paths" => Self::Files,
            _ => Self::Cli,
        }
    }

    /// Print search hits in this format.
    pub fn print_search_results(
        &self,
        query: &str,
        results: &[SearchHit],
    ) -> Result<(), anyhow::Error> {
        match self {
            Self::Cli => self.print_cli(results),
            Self::Json => self.print_json(query, results),
            Self::Markdown => self.print_markdown(results),
            Self::Csv => self.print_csv(results),
            Self::Files => self.print_files(results),
        }
    }

    fn print_cli(&self, results: &[SearchHit]) -> Result<(), anyhow::Error> {
        if results.is_empty() {
            println!("No results found.");
            return Ok(());
        }
        println!("Found {} results:", results.len());
        println!("{:<8} {:<30} File", "Score", "Title");
        println!("{}", "-".repeat(80));
        for hit in results {
            let title: String = hit.title.chars().take(30).collect();
            println!("{:<8.4} {:<30} {}", hit.score, title, hit.file);
        }
        Ok(())
    }

    fn print_json(&self, query: &str, results: &[SearchHit]) -> Result<(), anyhow::Error> {
        #[derive(Serialize)]
        struct JsonOutput<'a> {
            query: &'a str,
            total: usize,
            results: &'a [SearchHit],
        }
        let output = JsonOutput {
            query,
            total: results.len(),
            results,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }

    fn print_markdown(&self, results: &[SearchHit]) -> Result<(), anyhow::Error> {
        println!("# Search Results");
        println!();
        for (i, hit) in results.iter().enumerate() {
            println!("## {}. {}", i + 1, hit.title);
            println!("- **File**: {}", hit.file);
            println!("- **Score**: {:.4}", hit.score);
            println!();
        }
        Ok(())
    }

    fn print_csv(&self, results: &[SearchHit]) -> Result<(), anyhow::Error> {
        println!("file,title,score");
        for hit in results {
            println!("{},{},{:.4}", hit.file, csv_escape(&hit.title), hit.score);
        }
        Ok(())
    }

    fn print_files(&self, results: &[SearchHit]) -> Result<(), anyhow::Error> {
        for hit in results {
            println!("{}", hit.file);
        }
        Ok(())
    }
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_string() {
        assert_eq!(Format::from_string("json"), Format::Json);
        assert_eq!(Format::from_string("md"), Format::Markdown);
        assert_eq!(Format::from_string("markdown"), Format::Markdown);
        assert_eq!(Format::from_string("csv"), Format::Csv);
        assert_eq!(Format::from_string("paths"), Format::Files);
        assert_eq!(Format::from_string("anything-else"), Format::Cli);
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
