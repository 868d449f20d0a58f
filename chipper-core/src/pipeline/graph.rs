//! The fixed query graph and its wiring.

use super::{ChatGenerator, DocumentRetriever, PromptBuilder, Result, TextEmbedder};
use crate::provider::Message;
use crate::rag::Document;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// The nodes of the query graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Embedder,
    Retriever,
    PromptBuilder,
    Generator,
}

impl NodeKind {
    pub const ALL: [NodeKind; 4] = [
        NodeKind::Embedder,
        NodeKind::Retriever,
        NodeKind::PromptBuilder,
        NodeKind::Generator,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Embedder => "embedder",
            NodeKind::Retriever => "retriever",
            NodeKind::PromptBuilder => "prompt_builder",
            NodeKind::Generator => "llm",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A connection from one node's output to the next node's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: NodeKind,
    pub output: &'static str,
    pub to: NodeKind,
    pub input: &'static str,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} -> {}.{}", self.from, self.output, self.to, self.input)
    }
}

const EDGES: [Edge; 3] = [
    Edge {
        from: NodeKind::Embedder,
        output: "embedding",
        to: NodeKind::Retriever,
        input: "query_embedding",
    },
    Edge {
        from: NodeKind::Retriever,
        output: "documents",
        to: NodeKind::PromptBuilder,
        input: "documents",
    },
    Edge {
        from: NodeKind::PromptBuilder,
        output: "prompt",
        to: NodeKind::Generator,
        input: "messages",
    },
];

/// Per-query inputs supplied by the caller.
#[derive(Debug, Clone, Copy)]
pub struct PipelineInputs<'a> {
    pub question: &'a str,
    pub conversation: &'a [Message],
    pub system_prompt: &'a str,
}

/// Everything the graph produced for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub documents: Vec<Document>,
    pub prompt: Message,
    pub replies: Vec<Message>,
}

impl PipelineResponse {
    /// Text of the first reply, if the generator produced one.
    pub fn first_reply(&self) -> Option<&str> {
        self.replies.first().map(|reply| reply.content.as_str())
    }
}

/// An assembled query graph. Built once, run any number of times.
#[derive(Clone)]
pub struct PipelineGraph {
    embedder: Arc<dyn TextEmbedder>,
    retriever: Arc<dyn DocumentRetriever>,
    prompt_builder: PromptBuilder,
    generator: Arc<dyn ChatGenerator>,
}

impl PipelineGraph {
    pub fn new(
        embedder: Arc<dyn TextEmbedder>,
        retriever: Arc<dyn DocumentRetriever>,
        prompt_builder: PromptBuilder,
        generator: Arc<dyn ChatGenerator>,
    ) -> Self {
        Self {
            embedder,
            retriever,
            prompt_builder,
            generator,
        }
    }

    pub fn nodes(&self) -> &'static [NodeKind] {
        &NodeKind::ALL
    }

    pub fn edges(&self) -> &'static [Edge] {
        &EDGES
    }

    /// Runs the nodes in dependency order.
    pub async fn run(&self, inputs: &PipelineInputs<'_>) -> Result<PipelineResponse> {
        let embedding = self.embedder.embed(inputs.question).await?;
        debug!(dimensions = embedding.len(), "Question embedded");

        let documents = self.retriever.retrieve(&embedding).await?;

        let prompt = self
            .prompt_builder
            .build(inputs.system_prompt, inputs.conversation, &documents, inputs.question);

        let replies = self.generator.generate(std::slice::from_ref(&prompt)).await?;

        Ok(PipelineResponse {
            documents,
            prompt,
            replies,
        })
    }
}

impl fmt::Debug for PipelineGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineGraph")
            .field("nodes", &self.nodes())
            .field("edges", &self.edges())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct Fixed;

    #[async_trait]
    impl TextEmbedder for Fixed {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32])
        }
    }

    #[async_trait]
    impl DocumentRetriever for Fixed {
        async fn retrieve(&self, query_embedding: &[f32]) -> Result<Vec<Document>> {
            Ok(vec![Document::new("1", format!("len={}", query_embedding[0])).with_meta("file_path", "x.md")])
        }
    }

    struct Echo(Mutex<Vec<Message>>);

    #[async_trait]
    impl ChatGenerator for Echo {
        async fn generate(&self, messages: &[Message]) -> Result<Vec<Message>> {
            self.0.lock().unwrap().extend_from_slice(messages);
            Ok(vec![Message::assistant("ok")])
        }
    }

    #[test]
    fn test_wiring_is_a_chain() {
        let graph = PipelineGraph::new(
            Arc::new(Fixed),
            Arc::new(Fixed),
            PromptBuilder::new(),
            Arc::new(Echo(Mutex::new(vec![]))),
        );

        assert_eq!(graph.nodes().len(), 4);
        assert_eq!(graph.edges().len(), 3);

        let names: HashSet<_> = graph.nodes().iter().map(NodeKind::name).collect();
        assert_eq!(names.len(), 4);

        for pair in graph.edges().windows(2) {
            assert_eq!(pair[0].to, pair[1].from);
        }
        assert_eq!(graph.edges()[0].from, NodeKind::Embedder);
        assert_eq!(graph.edges()[2].to, NodeKind::Generator);
        assert_eq!(graph.edges()[0].to_string(), "embedder.embedding -> retriever.query_embedding");
    }

    #[tokio::test]
    async fn test_run_passes_outputs_downstream() {
        let generator = Arc::new(Echo(Mutex::new(vec![])));
        let graph = PipelineGraph::new(Arc::new(Fixed), Arc::new(Fixed), PromptBuilder::new(), generator.clone());

        let response = graph
            .run(&PipelineInputs {
                question: "four",
                conversation: &[],
                system_prompt: "sys",
            })
            .await
            .unwrap();

        assert_eq!(response.documents[0].content, "len=4");
        assert_eq!(response.first_reply(), Some("ok"));

        let seen = generator.0.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], response.prompt);
        assert!(response.prompt.content.contains("len=4\nSource: x.md"));
    }
}
