use rand::Rng;
use shared::{GameId, GAME_ID_CHARSET, GAME_ID_PREFIX, GAME_ID_SUFFIX_LEN};

/// Draws a game id: the fixed prefix followed by random alphanumerics.
///
/// Uniqueness is not checked here; the hub retries on collision.
pub fn generate_game_id<R: Rng + ?Sized>(rng: &mut R) -> GameId {
    let suffix: String = (0..GAME_ID_SUFFIX_LEN)
        .map(|_| GAME_ID_CHARSET[rng.gen_range(0..GAME_ID_CHARSET.len())] as char)
        .collect();
    GameId::new(format!("{}{}", GAME_ID_PREFIX, suffix))
}
