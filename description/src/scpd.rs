//! Service description (SCPD) parsing.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{optional, required, DescriptionError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Scpd {
    action_list: Option<ActionList>,
    service_state_table: Option<StateTable>,
}

#[derive(Debug, Default, Deserialize)]
struct ActionList {
    #[serde(rename = "action", default)]
    actions: Vec<ActionNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionNode {
    name: Option<String>,
    argument_list: Option<ArgumentList>,
}

#[derive(Debug, Default, Deserialize)]
struct ArgumentList {
    #[serde(rename = "argument", default)]
    arguments: Vec<ArgumentNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArgumentNode {
    name: Option<String>,
    direction: Option<String>,
    related_state_variable: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StateTable {
    #[serde(rename = "stateVariable", default)]
    variables: Vec<VariableNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariableNode {
    #[serde(rename = "@sendEvents")]
    send_events: Option<String>,
    name: Option<String>,
    data_type: Option<String>,
}

/// Direction of an action argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

impl FromStr for Direction {
    type Err = DescriptionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            d if d.eq_ignore_ascii_case("in") => Ok(Direction::In),
            d if d.eq_ignore_ascii_case("out") => Ok(Direction::Out),
            other => Err(DescriptionError::Malformed(format!(
                "Unknown argument direction: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
        }
    }
}

/// A declared action argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentSpec {
    pub name: String,
    pub direction: Direction,
    pub related_state_variable: Option<String>,
}

/// Declared name and ordered parameters of an invocable action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    pub name: String,
    /// Arguments in declaration order, which is also wire order
    pub arguments: Vec<ArgumentSpec>,
}

impl ActionSpec {
    /// Input arguments in declaration order.
    pub fn in_arguments(&self) -> impl Iterator<Item = &ArgumentSpec> {
        self.arguments
            .iter()
            .filter(|argument| argument.direction == Direction::In)
    }

    /// Output arguments in declaration order.
    pub fn out_arguments(&self) -> impl Iterator<Item = &ArgumentSpec> {
        self.arguments
            .iter()
            .filter(|argument| argument.direction == Direction::Out)
    }
}

/// A state variable from the service state table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateVariable {
    pub name: String,
    pub data_type: Option<String>,
    /// Whether changes are delivered through eventing (`sendEvents`, default yes)
    pub send_events: bool,
}

/// A parsed service description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDescription {
    pub actions: Vec<ActionSpec>,
    pub state_variables: Vec<StateVariable>,
}

impl ServiceDescription {
    /// Parse a service description from XML.
    ///
    /// A description without an `actionList` is valid and yields no actions;
    /// some services exist only to be evented.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let scpd: Scpd = quick_xml::de::from_str(xml)
            .map_err(|e| DescriptionError::Parse(format!("Failed to parse service XML: {}", e)))?;

        let actions = scpd
            .action_list
            .unwrap_or_default()
            .actions
            .into_iter()
            .map(to_action)
            .collect::<Result<Vec<_>>>()?;

        let state_variables = scpd
            .service_state_table
            .unwrap_or_default()
            .variables
            .into_iter()
            .map(to_state_variable)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            actions,
            state_variables,
        })
    }

    /// Look up an action by name.
    pub fn action(&self, name: &str) -> Option<&ActionSpec> {
        self.actions.iter().find(|action| action.name == name)
    }

    /// State variables whose changes are evented.
    pub fn evented_variables(&self) -> impl Iterator<Item = &StateVariable> {
        self.state_variables
            .iter()
            .filter(|variable| variable.send_events)
    }
}

fn to_action(node: ActionNode) -> Result<ActionSpec> {
    let name = required(node.name, "name", "action")?;
    let context = format!("argument of action {}", name);

    let arguments = node
        .argument_list
        .unwrap_or_default()
        .arguments
        .into_iter()
        .map(|argument| -> Result<ArgumentSpec> {
            let direction = required(argument.direction, "direction", &context)?.parse()?;
            Ok(ArgumentSpec {
                name: required(argument.name, "name", &context)?,
                direction,
                related_state_variable: optional(argument.related_state_variable),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ActionSpec { name, arguments })
}

fn to_state_variable(node: VariableNode) -> Result<StateVariable> {
    Ok(StateVariable {
        name: required(node.name, "name", "stateVariable")?,
        data_type: optional(node.data_type),
        send_events: optional(node.send_events)
            .map(|value| !value.eq_ignore_ascii_case("no"))
            .unwrap_or(true),
    })
}
