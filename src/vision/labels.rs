//! Class table for the letter model
//!
//! Position `i` in the model output vector is the score for `CLASSES[i]`.

/// Suffix marking an uppercase class identifier (e.g. `A_caps`)
const UPPERCASE_MARKER: &str = "_caps";

/// Class identifiers in model output order: 26 uppercase, then 26 lowercase
pub const CLASSES: [&str; 52] = [
    "A_caps", "B_caps", "C_caps", "D_caps", "E_caps", "F_caps", "G_caps", "H_caps", "I_caps",
    "J_caps", "K_caps", "L_caps", "M_caps", "N_caps", "O_caps", "P_caps", "Q_caps", "R_caps",
    "S_caps", "T_caps", "U_caps", "V_caps", "W_caps", "X_caps", "Y_caps", "Z_caps",
    "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o", "p", "q", "r", "s",
    "t", "u", "v", "w", "x", "y", "z",
];

/// Number of classes the model scores
pub const NUM_CLASSES: usize = CLASSES.len();

/// Convert a class identifier to the character shown to users.
///
/// `"A_caps"` becomes `"A"`; anything without the marker is returned unchanged.
pub fn display_label(raw: &str) -> String {
    if raw.ends_with(UPPERCASE_MARKER) {
        raw.chars()
            .next()
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_default()
    } else {
        raw.to_string()
    }
}

/// Display label for output position `index`
pub fn label_for_index(index: usize) -> Option<String> {
    CLASSES.get(index).map(|raw| display_label(raw))
}
