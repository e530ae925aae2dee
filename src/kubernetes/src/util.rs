use kube::{Resource, ResourceExt};

use super::error::Error;

pub fn get_namespace<T: Resource<DynamicType = ()>>(resource: &T) -> Result<String, Error> {
    resource.namespace().ok_or(Error::GetNamespace)
}

pub fn get_namespaced_name<T: Resource<DynamicType = ()>>(resource: &T) -> String {
    match resource.namespace() {
        Some(ns) => format!("{ns}/{}", resource.name_any()),
        None => resource.name_any(),
    }
}

pub fn diff<T: PartialEq + Clone>(prev: &[T], now: &[T]) -> (Vec<T>, Vec<T>, Vec<T>) {
    let removed = prev
        .iter()
        .filter(|p| !now.contains(p))
        .cloned()
        .collect::<Vec<T>>();
    let added = now
        .iter()
        .filter(|n| !prev.contains(n) && !removed.contains(n))
        .cloned()
        .collect::<Vec<T>>();
    let shared = prev
        .iter()
        .filter(|p| now.contains(p))
        .cloned()
        .collect::<Vec<T>>();
    (added, shared, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest(
        prev,
        now,
        expected,
        case(
            vec!["a".to_string(), "b".to_string()],
            vec!["a".to_string(), "b".to_string()],
            (vec![], vec!["a".to_string(), "b".to_string()], vec![]),
        ),
        case(
            vec!["a".to_string()],
            vec!["a".to_string(), "b".to_string()],
            (vec!["b".to_string()], vec!["a".to_string()], vec![]),
        ),
        case(
            vec!["a".to_string(), "b".to_string()],
            vec!["b".to_string()],
            (vec![], vec!["b".to_string()], vec!["a".to_string()]),
        ),
        case(
            vec!["a".to_string(), "c".to_string(), "d".to_string()],
            vec!["b".to_string(), "c".to_string()],
            (vec!["b".to_string()], vec!["c".to_string()], vec!["a".to_string(), "d".to_string()]),
        ),
    )]
    fn works_diff(
        prev: Vec<String>,
        now: Vec<String>,
        expected: (Vec<String>, Vec<String>, Vec<String>),
    ) {
        let (added, shared, removed) = diff::<String>(&prev, &now);
        assert_eq!(added, expected.0);
        assert_eq!(shared, expected.1);
        assert_eq!(removed, expected.2);
    }
}
