use crate::curve::{NamedCurveSet, TimeCurve};

const SIDES: [(&str, &str); 2] = [
    ("MouthFrownLeft", "MouthSmileLeft"),
    ("MouthFrownRight", "MouthSmileRight"),
];

fn balance_pair(frown: &mut TimeCurve, smile: &mut TimeCurve) {
    for (f, s) in frown.samples.iter_mut().zip(smile.samples.iter_mut()) {
        if f.value < s.value {
            let mean = (f.value + s.value) * 0.5;
            f.value = mean;
            s.value = mean;
        }
    }
}

/// Wherever frown < smile on a side, set both to their mean.
///
/// Runs only when all four channels exist; returns whether it ran. Samples are
/// matched by index.
pub fn balance_smile_frown(curves: &mut NamedCurveSet) -> bool {
    let complete = SIDES
        .iter()
        .all(|(frown, smile)| curves.contains_key(*frown) && curves.contains_key(*smile));
    if !complete {
        return false;
    }
    for (frown_name, smile_name) in SIDES {
        if let Some([frown, smile]) = curves.get_many_mut([frown_name, smile_name]) {
            balance_pair(frown, smile);
        }
    }
    true
}
