//! Line-mode console: parses typed commands and formats server frames

use shared::{AnswerSheet, Command, Push, RankingEntry, Response, ResponseCode};

/// Parses one typed line into a protocol command
///
/// Accepted forms, keyword case-insensitive:
/// - `join <name>`
/// - `start`
/// - `stop <json object>` or `stop City=Paris; Animal=Panda`
/// - `quit`
pub fn parse_line(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (keyword, rest) = match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    };

    match keyword.to_ascii_lowercase().as_str() {
        "join" if !rest.is_empty() => Ok(Command::Join {
            name: rest.to_string(),
        }),
        "join" => Err("usage: join <name>".to_string()),
        "start" => Ok(Command::Start),
        "stop" => parse_answers(rest).map(|answers| Command::Stop { answers }),
        "quit" | "exit" => Ok(Command::Quit),
        "" => Err("type join, start, stop or quit".to_string()),
        other => Err(format!("unknown command: {}", other)),
    }
}

/// Reads answers either as a JSON object or as `category=answer` pairs
pub fn parse_answers(input: &str) -> Result<AnswerSheet, String> {
    if input.starts_with('{') {
        return serde_json::from_str(input).map_err(|e| format!("invalid answers: {}", e));
    }

    let mut answers = AnswerSheet::new();
    for pair in input.split(';').map(str::trim).filter(|pair| !pair.is_empty()) {
        let (category, answer) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected category=answer, got {:?}", pair))?;
        answers.insert(category.trim().to_string(), answer.trim().to_string());
    }
    Ok(answers)
}

pub fn format_ranking(ranking: &[RankingEntry]) -> String {
    ranking
        .iter()
        .enumerate()
        .map(|(i, entry)| format!("{:>2}. {:<16} {:>4}", i + 1, entry.name, entry.score))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_response(response: &Response) -> String {
    let status = format!("[{}] {}", response.code.value(), response.code.text());
    if response.code != ResponseCode::Stopped {
        return status;
    }
    match response.ranking() {
        Ok(ranking) => format!("{}\n{}", status, format_ranking(&ranking)),
        Err(e) => format!("{} (unreadable ranking: {})", status, e),
    }
}

pub fn format_push(push: &Push) -> String {
    match push {
        Push::RoundStarted(init) => format!(
            "Round {} started! Letter: {}\nCategories: {}",
            init.round,
            init.letter,
            init.categories.join(", ")
        ),
        Push::StoppedBy(name) => format!("{} stopped the round, send your answers!", name),
        Push::Shutdown => "The server is shutting down".to_string(),
    }
}
