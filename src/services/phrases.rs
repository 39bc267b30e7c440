//! Lines the host says, with some variety.

use rand::seq::IndexedRandom;

fn pick(options: &[String]) -> String {
    options
        .choose(&mut rand::rng())
        .cloned()
        .unwrap_or_default()
}

/// Praise for a correct answer; the player keeps the board.
pub fn correct(player: &str) -> String {
    pick(&[
        format!("That's correct, {player}! You have control of the board."),
        format!("Yes, {player}, that's right! You now have control of the board."),
        format!("Correct, {player}! You get to select the next clue."),
        format!("Well done, {player}! The board is yours."),
    ])
}

/// Reaction to a wrong answer.
pub fn incorrect(player: &str) -> String {
    pick(&[
        format!("I'm sorry, {player}, that's incorrect."),
        format!("No, {player}, that's not right."),
        format!("That's incorrect, {player}."),
        format!("Sorry, {player}, that's not the answer we're looking for."),
    ])
}

/// Said when the buzzing player ran out of time.
pub fn answer_time_up(player: &str) -> String {
    format!("Time's up, {player}! I needed an answer.")
}

/// Said when nobody buzzed in time.
pub fn buzz_time_up(answer: &str) -> String {
    format!("Time's up! The correct answer was: {answer}.")
}

/// Said when every player missed the clue.
pub fn nobody_got_it(answer: &str) -> String {
    format!("Nobody got that one. The correct answer was: {answer}.")
}

/// Prompt for the player with control.
pub fn your_pick(player: &str) -> String {
    format!("{player}, please select the next clue.")
}

/// Acknowledges a buzz.
pub fn buzz_acknowledged(player: &str) -> String {
    format!("{player}?")
}

/// Opening line once the player quota is reached.
pub fn welcome(host: &str, players: &[String]) -> String {
    format!(
        "Welcome to the game, {}! I'm {host}. Tell me which topics you'd like while I prepare the board.",
        join_names(players)
    )
}

/// Closing line.
pub fn winner(player: &str, score: i64) -> String {
    format!("Congratulations, {player}! You win with ${score}.")
}

/// Readable list of names: "A", "A and B", "A, B and C".
pub fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phrases_name_the_player() {
        assert!(correct("Ann").contains("Ann"));
        assert!(incorrect("Bob").contains("Bob"));
    }

    #[test]
    fn joins_names_naturally() {
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(join_names(&names(&[])), "");
        assert_eq!(join_names(&names(&["Ann"])), "Ann");
        assert_eq!(join_names(&names(&["Ann", "Bob"])), "Ann and Bob");
        assert_eq!(join_names(&names(&["Ann", "Bob", "Cy"])), "Ann, Bob and Cy");
    }
}
