/// Static task registry with hot-swappable handlers
///
/// Every workflow node references a [`TaskType`]. The registry maps each type to its
/// static metadata (label, icon, credit cost, inputs, outputs) and to the handler that
/// actually runs it. Metadata never changes at runtime; the handler table is swapped
/// atomically with ArcSwap so handlers can be registered while executions are in flight.

use crate::tasks::handlers::{
    AddPropertyToJsonHandler, ApprovalGateHandler, DeliverViaWebhookHandler,
    ReadPropertyFromJsonHandler, TaskHandler,
};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};

/// Task types a workflow node can reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    LaunchBrowser,
    PageToHtml,
    ExtractTextFromElement,
    FillInput,
    ClickElement,
    WaitForElement,
    DeliverViaWebhook,
    ExtractDataWithAi,
    ReadPropertyFromJson,
    AddPropertyToJson,
    NavigateUrl,
    ScrollToElement,
    ApprovalGate,
}

impl TaskType {
    /// All task types, in registry order
    pub const ALL: [TaskType; 13] = [
        TaskType::LaunchBrowser,
        TaskType::PageToHtml,
        TaskType::ExtractTextFromElement,
        TaskType::FillInput,
        TaskType::ClickElement,
        TaskType::WaitForElement,
        TaskType::DeliverViaWebhook,
        TaskType::ExtractDataWithAi,
        TaskType::ReadPropertyFromJson,
        TaskType::AddPropertyToJson,
        TaskType::NavigateUrl,
        TaskType::ScrollToElement,
        TaskType::ApprovalGate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::LaunchBrowser => "LAUNCH_BROWSER",
            TaskType::PageToHtml => "PAGE_TO_HTML",
            TaskType::ExtractTextFromElement => "EXTRACT_TEXT_FROM_ELEMENT",
            TaskType::FillInput => "FILL_INPUT",
            TaskType::ClickElement => "CLICK_ELEMENT",
            TaskType::WaitForElement => "WAIT_FOR_ELEMENT",
            TaskType::DeliverViaWebhook => "DELIVER_VIA_WEBHOOK",
            TaskType::ExtractDataWithAi => "EXTRACT_DATA_WITH_AI",
            TaskType::ReadPropertyFromJson => "READ_PROPERTY_FROM_JSON",
            TaskType::AddPropertyToJson => "ADD_PROPERTY_TO_JSON",
            TaskType::NavigateUrl => "NAVIGATE_URL",
            TaskType::ScrollToElement => "SCROLL_TO_ELEMENT",
            TaskType::ApprovalGate => "APPROVAL_GATE",
        }
    }

    /// Static metadata for this task type
    pub fn definition(self) -> &'static TaskDefinition {
        // DEFINITIONS is declared in the same order as the enum
        &DEFINITIONS[self as usize]
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .iter()
            .copied()
            .find(|task_type| task_type.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown task type: {}", s))
    }
}

/// Kind of value flowing through a task input or output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskParamKind {
    String,
    BrowserInstance,
    Select,
    Credential,
}

/// A named input or output pin on a task
#[derive(Debug, Clone, Serialize)]
pub struct TaskParam {
    pub name: &'static str,
    pub kind: TaskParamKind,
    pub required: bool,
    /// Value is typed into the node rather than connected by an edge
    pub hide_handle: bool,
    /// Allowed values for `Select` inputs
    pub options: &'static [&'static str],
}

/// Static metadata for a task type
#[derive(Debug, Clone, Serialize)]
pub struct TaskDefinition {
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub label: &'static str,
    pub icon: &'static str,
    /// Credits charged each time a node of this type runs
    pub credits: u32,
    pub is_entry_point: bool,
    pub inputs: &'static [TaskParam],
    pub outputs: &'static [TaskParam],
}

const fn input(name: &'static str, kind: TaskParamKind) -> TaskParam {
    TaskParam { name, kind, required: true, hide_handle: false, options: &[] }
}

const fn output(name: &'static str, kind: TaskParamKind) -> TaskParam {
    TaskParam { name, kind, required: false, hide_handle: false, options: &[] }
}

const WEB_PAGE_IN: TaskParam = input("Web page", TaskParamKind::BrowserInstance);
const WEB_PAGE_OUT: TaskParam = output("Web page", TaskParamKind::BrowserInstance);
const SELECTOR: TaskParam = input("Selector", TaskParamKind::String);

static DEFINITIONS: [TaskDefinition; 13] = [
    TaskDefinition {
        task_type: TaskType::LaunchBrowser,
        label: "Launch browser",
        icon: "GlobeIcon",
        credits: 5,
        is_entry_point: true,
        inputs: &[TaskParam {
            name: "Website Url",
            kind: TaskParamKind::String,
            required: true,
            hide_handle: true,
            options: &[],
        }],
        outputs: &[WEB_PAGE_OUT],
    },
    TaskDefinition {
        task_type: TaskType::PageToHtml,
        label: "Get html from page",
        icon: "CodeIcon",
        credits: 2,
        is_entry_point: false,
        inputs: &[WEB_PAGE_IN],
        outputs: &[output("Html", TaskParamKind::String), WEB_PAGE_OUT],
    },
    TaskDefinition {
        task_type: TaskType::ExtractTextFromElement,
        label: "Extract text from element",
        icon: "TextIcon",
        credits: 2,
        is_entry_point: false,
        inputs: &[input("Html", TaskParamKind::String), SELECTOR],
        outputs: &[output("Extracted text", TaskParamKind::String)],
    },
    TaskDefinition {
        task_type: TaskType::FillInput,
        label: "Fill input",
        icon: "Edit3Icon",
        credits: 1,
        is_entry_point: false,
        inputs: &[WEB_PAGE_IN, SELECTOR, input("Value", TaskParamKind::String)],
        outputs: &[WEB_PAGE_OUT],
    },
    TaskDefinition {
        task_type: TaskType::ClickElement,
        label: "Click element",
        icon: "MousePointerClick",
        credits: 1,
        is_entry_point: false,
        inputs: &[WEB_PAGE_IN, SELECTOR],
        outputs: &[WEB_PAGE_OUT],
    },
    TaskDefinition {
        task_type: TaskType::WaitForElement,
        label: "Wait for element",
        icon: "EyeIcon",
        credits: 1,
        is_entry_point: false,
        inputs: &[
            WEB_PAGE_IN,
            SELECTOR,
            TaskParam {
                name: "Visibility",
                kind: TaskParamKind::Select,
                required: true,
                hide_handle: true,
                options: &["visible", "hidden"],
            },
        ],
        outputs: &[WEB_PAGE_OUT],
    },
    TaskDefinition {
        task_type: TaskType::DeliverViaWebhook,
        label: "Deliver via webhook",
        icon: "SendIcon",
        credits: 1,
        is_entry_point: false,
        inputs: &[input("Target URL", TaskParamKind::String), input("Body", TaskParamKind::String)],
        outputs: &[],
    },
    TaskDefinition {
        task_type: TaskType::ExtractDataWithAi,
        label: "Extract data with AI",
        icon: "BrainIcon",
        credits: 4,
        is_entry_point: false,
        inputs: &[
            input("Content", TaskParamKind::String),
            input("Credentials", TaskParamKind::Credential),
            input("Prompt", TaskParamKind::String),
        ],
        outputs: &[output("Extracted data", TaskParamKind::String)],
    },
    TaskDefinition {
        task_type: TaskType::ReadPropertyFromJson,
        label: "Read property from JSON",
        icon: "FileJson2Icon",
        credits: 1,
        is_entry_point: false,
        inputs: &[input("JSON", TaskParamKind::String), input("Property name", TaskParamKind::String)],
        outputs: &[output("Property value", TaskParamKind::String)],
    },
    TaskDefinition {
        task_type: TaskType::AddPropertyToJson,
        label: "Add property to JSON",
        icon: "DatabaseIcon",
        credits: 1,
        is_entry_point: false,
        inputs: &[
            input("JSON", TaskParamKind::String),
            input("Property name", TaskParamKind::String),
            input("Property value", TaskParamKind::String),
        ],
        outputs: &[output("Update JSON", TaskParamKind::String)],
    },
    TaskDefinition {
        task_type: TaskType::NavigateUrl,
        label: "Navigate URL",
        icon: "Link2Icon",
        credits: 2,
        is_entry_point: false,
        inputs: &[WEB_PAGE_IN, input("URL", TaskParamKind::String)],
        outputs: &[WEB_PAGE_OUT],
    },
    TaskDefinition {
        task_type: TaskType::ScrollToElement,
        label: "Scroll to element",
        icon: "ArrowUpIcon",
        credits: 1,
        is_entry_point: false,
        inputs: &[WEB_PAGE_IN, SELECTOR],
        outputs: &[WEB_PAGE_OUT],
    },
    TaskDefinition {
        task_type: TaskType::ApprovalGate,
        label: "Wait for approval",
        icon: "HandIcon",
        credits: 0,
        is_entry_point: false,
        inputs: &[TaskParam {
            name: "Message",
            kind: TaskParamKind::String,
            required: false,
            hide_handle: false,
            options: &[],
        }],
        outputs: &[],
    },
];

/// Task metadata plus the handler table used by the execution engine
pub struct TaskRegistry {
    /// Atomic pointer to the handler map, swapped on registration
    handlers: ArcSwap<HashMap<TaskType, Arc<dyn TaskHandler>>>,
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut registered: Vec<&'static str> =
            self.handlers.load().keys().map(|task_type| task_type.as_str()).collect();
        registered.sort_unstable();
        f.debug_struct("TaskRegistry").field("handlers", &registered).finish()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    /// Registry with metadata only and no handlers
    pub fn new() -> Self {
        Self {
            handlers: ArcSwap::new(Arc::new(HashMap::new())),
        }
    }

    /// Registry with the handlers that need no external runtime
    ///
    /// Browser and AI tasks stay unregistered; hosts that ship those runtimes
    /// plug them in with [`TaskRegistry::register_handler`].
    pub fn with_builtin_handlers(http: reqwest::Client) -> Self {
        let registry = Self::new();
        registry.register_handler(TaskType::ReadPropertyFromJson, Arc::new(ReadPropertyFromJsonHandler));
        registry.register_handler(TaskType::AddPropertyToJson, Arc::new(AddPropertyToJsonHandler));
        registry.register_handler(TaskType::DeliverViaWebhook, Arc::new(DeliverViaWebhookHandler::new(http)));
        registry.register_handler(TaskType::ApprovalGate, Arc::new(ApprovalGateHandler));
        registry
    }

    pub fn definition(&self, task_type: TaskType) -> &'static TaskDefinition {
        task_type.definition()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &'static TaskDefinition> {
        DEFINITIONS.iter()
    }

    /// Credit cost of a single node of this type
    pub fn credits(&self, task_type: TaskType) -> u32 {
        task_type.definition().credits
    }

    /// Install or replace the handler for a task type (lock-free for readers)
    pub fn register_handler(&self, task_type: TaskType, handler: Arc<dyn TaskHandler>) {
        self.handlers.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(task_type, Arc::clone(&handler));
            next
        });
        tracing::debug!("🔌 Registered handler for task type {}", task_type);
    }

    pub fn handler(&self, task_type: TaskType) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.load().get(&task_type).cloned()
    }

    pub fn has_handler(&self, task_type: TaskType) -> bool {
        self.handlers.load().contains_key(&task_type)
    }
}
