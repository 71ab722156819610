use crate::{ParamShape, QueryTemplate};
use rand::rngs::StdRng;
use rand::Rng;

/// Scale of the synthetic dataset a worker should assume exists, so
/// generated ids/foreign keys stay within a plausible range.
#[derive(Debug, Clone, Copy)]
pub struct EntityCounts {
    pub accounts: u64,
}

impl Default for EntityCounts {
    fn default() -> Self {
        Self { accounts: 100_000 }
    }
}

/// A generated, typed query parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

/// Element type of [`ParamShape::Custom`]: one parameter's generation rule.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ParamKind {
    AccountId,
    Int { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    Text { len: usize },
    Bool,
}

fn account_id(rng: &mut StdRng, entities: &EntityCounts) -> QueryParam {
    let bound = entities.accounts.max(1) as i64;
    QueryParam::Int(rng.gen_range(0..bound))
}

fn random_text(rng: &mut StdRng, len: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

fn generate_one(kind: &ParamKind, rng: &mut StdRng, entities: &EntityCounts) -> QueryParam {
    match kind {
        ParamKind::AccountId => account_id(rng, entities),
        ParamKind::Int { min, max } => QueryParam::Int(rng.gen_range(*min..(*max).max(*min + 1))),
        ParamKind::Float { min, max } => QueryParam::Float(rng.gen_range(*min..(*max).max(*min + f64::EPSILON))),
        ParamKind::Text { len } => QueryParam::Text(random_text(rng, *len)),
        ParamKind::Bool => QueryParam::Bool(rng.gen_bool(0.5)),
    }
}

/// Synthesize argument values for `template`, shaped by `template.params`.
pub fn generate_args(template: &QueryTemplate, rng: &mut StdRng, entities: &EntityCounts) -> Vec<QueryParam> {
    match &template.params {
        ParamShape::AccountId => vec![account_id(rng, entities)],
        ParamShape::FloatRange { min, max } => {
            vec![QueryParam::Float(rng.gen_range(*min..(*max).max(*min + f64::EPSILON)))]
        }
        ParamShape::InsertRow { scalars } => (0..*scalars)
            .map(|_| QueryParam::Float(rng.gen_range(0.0..1_000_000.0)))
            .collect(),
        ParamShape::Custom(kinds) => kinds.iter().map(|k| generate_one(k, rng, entities)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QueryKind;
    use rand::SeedableRng;

    fn template(params: ParamShape) -> QueryTemplate {
        QueryTemplate {
            name: "t".into(),
            sql: "SELECT 1".into(),
            weight: 1,
            kind: QueryKind::Read,
            params,
        }
    }

    #[test]
    fn account_id_stays_within_bound() {
        let mut rng = StdRng::seed_from_u64(1);
        let entities = EntityCounts { accounts: 10 };
        let t = template(ParamShape::AccountId);
        for _ in 0..100 {
            let args = generate_args(&t, &mut rng, &entities);
            assert_eq!(args.len(), 1);
            if let QueryParam::Int(v) = args[0] {
                assert!(v >= 0 && v < 10);
            } else {
                panic!("expected Int param");
            }
        }
    }

    #[test]
    fn insert_row_produces_requested_scalar_count() {
        let mut rng = StdRng::seed_from_u64(1);
        let entities = EntityCounts::default();
        let t = template(ParamShape::InsertRow { scalars: 5 });
        let args = generate_args(&t, &mut rng, &entities);
        assert_eq!(args.len(), 5);
    }

    #[test]
    fn custom_shape_dispatches_each_kind() {
        let mut rng = StdRng::seed_from_u64(1);
        let entities = EntityCounts::default();
        let t = template(ParamShape::Custom(vec![
            ParamKind::AccountId,
            ParamKind::Bool,
            ParamKind::Text { len: 8 },
        ]));
        let args = generate_args(&t, &mut rng, &entities);
        assert_eq!(args.len(), 3);
        assert!(matches!(args[0], QueryParam::Int(_)));
        assert!(matches!(args[1], QueryParam::Bool(_)));
        if let QueryParam::Text(ref s) = args[2] {
            assert_eq!(s.len(), 8);
        } else {
            panic!("expected Text param");
        }
    }
}
