use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::ElementRef;

/// Rendered-looking text of an element, one entry per visual line.
///
/// Block elements and `<br>` break lines, whitespace runs collapse to a
/// single space, and lines that end up blank are dropped.
pub(crate) fn visible_lines(element: ElementRef) -> Vec<String> {
    let mut ctx = LineBuilder::default();
    visit_children(element, &mut ctx);
    ctx.into_lines()
}

pub(crate) fn visible_text(element: ElementRef) -> String {
    visible_lines(element).join("\n")
}

fn visit_node(node: NodeRef<'_, Node>, ctx: &mut LineBuilder) {
    match node.value() {
        Node::Text(text) => ctx.append_text(text),
        Node::Element(_) => {
            if let Some(element) = ElementRef::wrap(node) {
                visit_element(element, ctx);
            }
        }
        _ => {
            for child in node.children() {
                visit_node(child, ctx);
            }
        }
    }
}

fn visit_element(element: ElementRef, ctx: &mut LineBuilder) {
    let tag = element.value().name().to_ascii_lowercase();
    match tag.as_str() {
        "br" => ctx.break_line(),
        "script" | "style" | "noscript" | "template" => {}
        "p" | "div" | "section" | "article" | "header" | "footer" | "li" | "ul" | "ol"
        | "blockquote" | "figure" | "figcaption" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
        | "time" => {
            ctx.break_line();
            visit_children(element, ctx);
            ctx.break_line();
        }
        _ => visit_children(element, ctx),
    }
}

fn visit_children(element: ElementRef, ctx: &mut LineBuilder) {
    for child in element.children() {
        visit_node(child, ctx);
    }
}

#[derive(Default)]
struct LineBuilder {
    lines: Vec<String>,
    current: String,
}

impl LineBuilder {
    fn append_text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                if self.current.is_empty() || self.current.ends_with(' ') {
                    continue;
                }
                self.current.push(' ');
            } else {
                self.current.push(ch);
            }
        }
    }

    fn break_line(&mut self) {
        let line = self.current.trim();
        if !line.is_empty() {
            self.lines.push(line.to_string());
        }
        self.current.clear();
    }

    fn into_lines(mut self) -> Vec<String> {
        self.break_line();
        self.lines
    }
}
