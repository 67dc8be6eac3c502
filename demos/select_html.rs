//! Compile a selector, print its program and list the matching elements
//!
//! ```text
//! cargo run --example select_html -- "html body div p"
//! ```

use nodematch::{compile, parse_html};

const DOCUMENT: &str = r#"<!DOCTYPE html>
<html>
<head><title>Demo</title></head>
<body>
  <div id="main" class="content wide">
    <p lang="en">Hello</p>
    <div class="note"><p lang="fr">Bonjour</p></div>
  </div>
  <div><p>Plain</p></div>
</body>
</html>
"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let selector = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "html body div []* p".to_string());

    let program = compile(&selector)?;
    println!("{}", selector);
    print!("{}", program);
    println!();

    let tree = parse_html(DOCUMENT)?;
    for id in program.select_all(&tree) {
        let node = &tree.nodes[id];
        println!("{:>3}  {:<24} {}", id, tree.tag_path(id).join(" "), node.text);
    }
    Ok(())
}
