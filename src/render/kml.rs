use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use _model::Waypoint;
use anyhow::{Context, Result};
use quick_xml::{
    events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Writer,
};

/// Document level metadata shared by both overlay files.
pub struct Document<'a> {
    pub name: &'a str,
    pub author: &'a str,
    pub link: &'a str,
}

/// Writes one placemark per waypoint. With `icon` every placemark gets an
/// inline icon style pointing at that URL.
pub fn write(path: &Path, doc: &Document, waypoints: &[Waypoint], icon: Option<&str>) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut output = BufWriter::new(file);
    render(&mut output, doc, waypoints, icon)?;
    output.flush()?;
    Ok(())
}

pub fn render<W: Write>(
    output: W,
    doc: &Document,
    waypoints: &[Waypoint],
    icon: Option<&str>,
) -> Result<()> {
    let mut w = Writer::new_with_indent(output, b' ', 4);
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    w.write_event(Event::Start(BytesStart::new("kml").with_attributes([
        ("xmlns", "http://www.opengis.net/kml/2.2"),
        ("xmlns:atom", "http://www.w3.org/2005/Atom"),
    ])))?;
    w.write_event(Event::Start(BytesStart::new("Document")))?;

    cdata(&mut w, "name", doc.name)?;
    text(&mut w, "visibility", "1")?;
    text(&mut w, "open", "1")?;
    w.write_event(Event::Start(BytesStart::new("atom:author")))?;
    text(&mut w, "atom:name", doc.author)?;
    w.write_event(Event::End(BytesEnd::new("atom:author")))?;
    w.write_event(Event::Empty(
        BytesStart::new("atom:link").with_attributes([("href", doc.link)]),
    ))?;

    for x in waypoints {
        w.write_event(Event::Start(BytesStart::new("Placemark")))?;
        cdata(&mut w, "name", &x.name)?;
        if !x.description.is_empty() {
            text(&mut w, "description", &x.description)?;
        }
        if let Some(href) = icon {
            w.write_event(Event::Start(BytesStart::new("Style")))?;
            w.write_event(Event::Start(BytesStart::new("IconStyle")))?;
            w.write_event(Event::Start(BytesStart::new("Icon")))?;
            text(&mut w, "href", href)?;
            w.write_event(Event::End(BytesEnd::new("Icon")))?;
            w.write_event(Event::End(BytesEnd::new("IconStyle")))?;
            w.write_event(Event::End(BytesEnd::new("Style")))?;
        }
        w.write_event(Event::Start(BytesStart::new("Point")))?;
        text(&mut w, "coordinates", &format!("{},{},0", x.lon, x.lat))?;
        w.write_event(Event::End(BytesEnd::new("Point")))?;
        w.write_event(Event::End(BytesEnd::new("Placemark")))?;
    }

    w.write_event(Event::End(BytesEnd::new("Document")))?;
    w.write_event(Event::End(BytesEnd::new("kml")))?;
    w.get_mut().write_all(b"\n")?;
    Ok(())
}

fn text<W: Write>(w: &mut Writer<W>, tag: &str, value: &str) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new(tag)))?;
    w.write_event(Event::Text(BytesText::new(value)))?;
    w.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn cdata<W: Write>(w: &mut Writer<W>, tag: &str, value: &str) -> Result<()> {
    // a CDATA section cannot contain its own terminator
    if value.contains("]]>") {
        return text(w, tag, value);
    }
    w.write_event(Event::Start(BytesStart::new(tag)))?;
    w.write_event(Event::CData(BytesCData::new(value)))?;
    w.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}
