//! Constructor overload resolution.

use crate::container::autowiring::ParameterInfo;
use crate::container::descriptor::ServiceId;
use crate::errors::ContainerError;

/// Type of an explicitly supplied constructor argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentType {
    Typed(ServiceId),
    /// A null argument, accepted only by nullable parameters
    Null,
}

impl std::fmt::Display for ArgumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgumentType::Typed(id) => f.write_str(id.type_name()),
            ArgumentType::Null => f.write_str("null"),
        }
    }
}

/// Chosen constructor and where each supplied argument goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Index into the declared constructors
    pub index: usize,
    /// For each parameter, the index of the supplied argument bound to it
    pub bindings: Vec<Option<usize>>,
}

impl Selection {
    pub fn matched(&self) -> usize {
        self.bindings.iter().filter(|binding| binding.is_some()).count()
    }
}

/// Pick the best constructor for the supplied argument types.
///
/// A constructor is viable when every supplied argument maps to a distinct
/// parameter of the same type, or a null to a nullable parameter. Among viable
/// constructors the one with the most parameters wins, then the one matching
/// the most arguments, then the first declared.
pub fn select_constructor<'a, I>(
    implementation: &str,
    signatures: I,
    supplied: &[ArgumentType],
) -> Result<Selection, ContainerError>
where
    I: IntoIterator<Item = &'a [ParameterInfo]>,
{
    let mut best: Option<(usize, Selection)> = None;

    for (index, parameters) in signatures.into_iter().enumerate() {
        let Some(bindings) = bind_arguments(parameters, supplied) else {
            continue;
        };
        let candidate = Selection { index, bindings };

        let better = match &best {
            None => true,
            Some((best_count, best_selection)) => {
                (parameters.len(), candidate.matched()) > (*best_count, best_selection.matched())
            }
        };
        if better {
            best = Some((parameters.len(), candidate));
        }
    }

    best.map(|(_, selection)| selection)
        .ok_or_else(|| ContainerError::NoViableConstructor {
            implementation: implementation.to_string(),
            supplied: supplied
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        })
}

/// Map every supplied argument onto a distinct compatible parameter.
///
/// Typed arguments go first and prefer non-nullable parameters, which leaves
/// the most nullable slots free for null arguments.
fn bind_arguments(parameters: &[ParameterInfo], supplied: &[ArgumentType]) -> Option<Vec<Option<usize>>> {
    let mut bindings: Vec<Option<usize>> = vec![None; parameters.len()];

    for (argument, argument_type) in supplied.iter().enumerate() {
        if let ArgumentType::Typed(service_id) = argument_type {
            let slot = parameters
                .iter()
                .enumerate()
                .filter(|(slot, parameter)| bindings[*slot].is_none() && parameter.service_id == *service_id)
                .min_by_key(|(_, parameter)| parameter.is_nullable())
                .map(|(slot, _)| slot)?;
            bindings[slot] = Some(argument);
        }
    }

    for (argument, argument_type) in supplied.iter().enumerate() {
        if let ArgumentType::Null = argument_type {
            let slot = (0..parameters.len())
                .find(|&slot| bindings[slot].is_none() && parameters[slot].is_nullable())?;
            bindings[slot] = Some(argument);
        }
    }

    Some(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::autowiring::Constructor;

    trait Logger: Send + Sync {}
    struct Config;
    struct Clock;

    fn signatures() -> Vec<Constructor<()>> {
        vec![
            Constructor::new(|_| Ok(())).param::<dyn Logger>("logger"),
            Constructor::new(|_| Ok(()))
                .param::<dyn Logger>("logger")
                .param::<Config>("config"),
        ]
    }

    fn select(constructors: &[Constructor<()>], supplied: &[ArgumentType]) -> Result<Selection, ContainerError> {
        select_constructor("test::Target", constructors.iter().map(|c| c.parameters()), supplied)
    }

    #[test]
    fn test_most_parameters_wins_for_pure_di() {
        let selection = select(&signatures(), &[]).unwrap();
        assert_eq!(selection.index, 1);
        assert_eq!(selection.bindings, vec![None, None]);
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let constructors = vec![
            Constructor::<()>::new(|_| Ok(())).param::<Config>("config"),
            Constructor::<()>::new(|_| Ok(())).param::<Clock>("clock"),
        ];
        assert_eq!(select(&constructors, &[]).unwrap().index, 0);
    }

    #[test]
    fn test_supplied_argument_must_map() {
        let constructors = vec![
            Constructor::<()>::new(|_| Ok(())).param::<Config>("config").param::<Clock>("clock"),
            Constructor::<()>::new(|_| Ok(())).param::<dyn Logger>("logger"),
        ];
        let supplied = [ArgumentType::Typed(ServiceId::of::<dyn Logger>())];

        let selection = select(&constructors, &supplied).unwrap();
        assert_eq!(selection.index, 1);
        assert_eq!(selection.bindings, vec![Some(0)]);
    }

    #[test]
    fn test_null_matches_only_nullable_parameters() {
        let constructors = vec![
            Constructor::<()>::new(|_| Ok(())).param::<Config>("config"),
            Constructor::<()>::new(|_| Ok(()))
                .param::<Clock>("clock")
                .optional_param::<Config>("config"),
        ];

        let selection = select(&constructors, &[ArgumentType::Null]).unwrap();
        assert_eq!(selection.index, 1);
        assert_eq!(selection.bindings, vec![None, Some(0)]);
    }

    #[test]
    fn test_typed_arguments_leave_nullable_slots_for_nulls() {
        let constructors = vec![Constructor::<()>::new(|_| Ok(()))
            .optional_param::<Config>("primary")
            .param::<Config>("secondary")];
        let supplied = [ArgumentType::Null, ArgumentType::Typed(ServiceId::of::<Config>())];

        let selection = select(&constructors, &supplied).unwrap();
        assert_eq!(selection.bindings, vec![Some(0), Some(1)]);
    }

    #[test]
    fn test_no_viable_constructor_names_arguments() {
        let supplied = [ArgumentType::Typed(ServiceId::of::<Clock>()), ArgumentType::Null];

        match select(&signatures(), &supplied) {
            Err(ContainerError::NoViableConstructor { implementation, supplied }) => {
                assert_eq!(implementation, "test::Target");
                assert!(supplied.ends_with("Clock, null"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_zero_constructors_is_not_viable() {
        assert!(select(&[], &[]).is_err());
    }
}
